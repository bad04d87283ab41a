//! Zoom/pan controller
//!
//! Zoom is a single factor applied to the container width. Every change
//! is anchored: the document point under the anchor (viewport
//! coordinates) stays under it, which is achieved by returning the
//! corrected scroll offset together with the new scale so both are applied
//! in the same call.

use crate::layout::{Point, ScrollOffset, Size};

pub const MIN_ZOOM: f64 = 0.5;
pub const MAX_ZOOM: f64 = 3.0;
/// Scale changes smaller than this are ignored
pub const ZOOM_EPSILON: f64 = 1e-3;
/// Finger distance below which a pinch cannot start
const MIN_PINCH_DISTANCE: f64 = 1.0;

/// Session-local zoom state, never persisted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    pub scale: f64,
    /// Scale at the start of the current gesture (equal to `scale` when idle)
    pub base_scale: f64,
    /// Document point (at the current scale) of the last anchor
    pub anchor: Point,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            base_scale: 1.0,
            anchor: Point::default(),
        }
    }
}

/// Values captured once when a two-finger gesture starts.
///
/// Every pinch frame is computed relative to this snapshot, never to the
/// previous frame, so rounding does not accumulate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureSnapshot {
    start_distance: f64,
    base_scale: f64,
}

impl GestureSnapshot {
    fn capture(touches: [Point; 2], scale: f64) -> Option<Self> {
        let start_distance = Point::distance(touches[0], touches[1]);
        if !start_distance.is_finite() || start_distance < MIN_PINCH_DISTANCE {
            return None;
        }
        Some(Self {
            start_distance,
            base_scale: scale,
        })
    }

    pub fn start_distance(&self) -> f64 {
        self.start_distance
    }

    pub fn base_scale(&self) -> f64 {
        self.base_scale
    }

    /// Unclamped scale for the current finger positions
    pub fn scale_for(&self, touches: [Point; 2]) -> f64 {
        self.base_scale * (Point::distance(touches[0], touches[1]) / self.start_distance)
    }
}

/// Result of an applied zoom step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomChange {
    pub previous_scale: f64,
    pub scale: f64,
    /// Scroll offset keeping the anchor fixed; apply with the new scale
    pub scroll: ScrollOffset,
}

/// Clamp a requested scale into `[MIN_ZOOM, MAX_ZOOM]`
pub fn clamp_scale(scale: f64) -> f64 {
    scale.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// Scroll offset that keeps the document point under `anchor` in place
/// when going from `previous_scale` to `scale`.
pub fn anchored_scroll(previous_scale: f64, scale: f64, anchor: Point, scroll: ScrollOffset) -> ScrollOffset {
    let doc_x = scroll.x + anchor.x;
    let doc_y = scroll.y + anchor.y;
    let ratio = scale / previous_scale;
    ScrollOffset::new(doc_x * ratio - anchor.x, doc_y * ratio - anchor.y)
}

#[derive(Debug, Clone, Default)]
pub struct ZoomController {
    state: ZoomState,
    gesture: Option<GestureSnapshot>,
}

impl ZoomController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scale(&self) -> f64 {
        self.state.scale
    }

    pub fn state(&self) -> ZoomState {
        self.state
    }

    pub fn gesture(&self) -> Option<GestureSnapshot> {
        self.gesture
    }

    pub fn is_pinching(&self) -> bool {
        self.gesture.is_some()
    }

    /// Zoom to `new_scale` around `anchor` (viewport coordinates, defaults
    /// to the viewport center). Returns `None` when the clamped scale is
    /// within [`ZOOM_EPSILON`] of the current one.
    pub fn set_zoom(
        &mut self,
        new_scale: f64,
        anchor: Option<Point>,
        scroll: ScrollOffset,
        viewport: Size,
    ) -> Option<ZoomChange> {
        if !new_scale.is_finite() {
            return None;
        }
        let previous_scale = self.state.scale;
        let scale = clamp_scale(new_scale);
        if (scale - previous_scale).abs() < ZOOM_EPSILON {
            return None;
        }

        let anchor = anchor.unwrap_or_else(|| viewport.center());
        let scroll = anchored_scroll(previous_scale, scale, anchor, scroll);

        self.state.scale = scale;
        self.state.anchor = Point::new(scroll.x + anchor.x, scroll.y + anchor.y);
        if self.gesture.is_none() {
            self.state.base_scale = scale;
        }

        tracing::debug!(from = previous_scale, to = scale, "Zoom changed");
        Some(ZoomChange {
            previous_scale,
            scale,
            scroll,
        })
    }

    /// Capture the gesture snapshot. Returns `false` if the fingers are too
    /// close together to define a distance.
    pub fn begin_pinch(&mut self, touches: [Point; 2]) -> bool {
        match GestureSnapshot::capture(touches, self.state.scale) {
            Some(snapshot) => {
                self.state.base_scale = snapshot.base_scale;
                self.gesture = Some(snapshot);
                true
            }
            None => false,
        }
    }

    /// Apply one pinch frame, anchored at the current finger midpoint
    pub fn update_pinch(
        &mut self,
        touches: [Point; 2],
        scroll: ScrollOffset,
        viewport: Size,
    ) -> Option<ZoomChange> {
        let snapshot = self.gesture?;
        let target = snapshot.scale_for(touches);
        let anchor = Point::midpoint(touches[0], touches[1]);
        self.set_zoom(target, Some(anchor), scroll, viewport)
    }

    /// Finish the gesture, returning its snapshot
    pub fn end_pinch(&mut self) -> Option<GestureSnapshot> {
        let snapshot = self.gesture.take();
        self.state.base_scale = self.state.scale;
        snapshot
    }
}
