//! Viewport lazy-load controller
//!
//! Two independent observations run against the scroll viewport:
//!
//! 1. Membership: a page belongs when it intersects the viewport grown by
//!    the prefetch margin. Members in `Unloaded` state get rendered. Pages
//!    outside the (larger) eviction margin lose their raster.
//! 2. Reading position: the page with the largest overlap with the middle
//!    band of the viewport is the current page.

use crate::config::ReaderConfig;
use crate::layout::PageLayout;

/// Fraction of the viewport height used for the reading-position band
pub const CENTER_BAND: f64 = 0.5;

/// Per-page render state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Placeholder only, no raster memory
    Unloaded,
    Rendering,
    Rendered,
    /// Last render failed; retried only when the page re-enters the viewport
    Failed,
}

/// Actions produced by one viewport evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewportUpdate {
    /// Pages that should start rendering, ascending
    pub to_render: Vec<u32>,
    /// Pages whose raster should be released, ascending
    pub to_evict: Vec<u32>,
    /// New reading position, when it changed
    pub current_page: Option<u32>,
}

/// Tracks viewport membership and the current reading page
#[derive(Debug, Clone)]
pub struct ViewportController {
    prefetch_margin: f64,
    evict_margin: f64,
    intersecting: Vec<bool>,
    current_page: u32,
}

impl ViewportController {
    pub fn new(page_count: u32, prefetch_margin: f64, evict_margin: f64) -> Self {
        Self {
            prefetch_margin: prefetch_margin.max(0.0),
            evict_margin: evict_margin.max(prefetch_margin).max(0.0),
            intersecting: vec![false; page_count as usize],
            current_page: 1,
        }
    }

    pub fn from_config(page_count: u32, config: &ReaderConfig) -> Self {
        Self::new(page_count, config.prefetch_margin_px, config.evict_margin_px)
    }

    pub fn page_count(&self) -> u32 {
        self.intersecting.len() as u32
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Set the reading position directly (jumps, hydration), clamped to
    /// `1..=page_count`
    pub fn set_current_page(&mut self, page: u32) -> u32 {
        self.current_page = page.clamp(1, self.page_count().max(1));
        self.current_page
    }

    /// Whether the page was a member at the last evaluation
    pub fn is_intersecting(&self, page: u32) -> bool {
        page.checked_sub(1)
            .and_then(|i| self.intersecting.get(i as usize))
            .copied()
            .unwrap_or(false)
    }

    /// Re-evaluate membership and reading position.
    ///
    /// `states[i]` is the render state of page `i + 1`.
    pub fn update(
        &mut self,
        layout: &PageLayout,
        scroll_y: f64,
        viewport_height: f64,
        states: &[PageState],
    ) -> ViewportUpdate {
        let mut update = ViewportUpdate::default();

        let member_top = scroll_y - self.prefetch_margin;
        let member_bottom = scroll_y + viewport_height + self.prefetch_margin;
        let keep_top = scroll_y - self.evict_margin;
        let keep_bottom = scroll_y + viewport_height + self.evict_margin;

        for (page, top, bottom) in layout.spans() {
            let index = (page - 1) as usize;
            let Some(was_member) = self.intersecting.get(index).copied() else {
                break;
            };
            let is_member = overlaps(top, bottom, member_top, member_bottom);
            self.intersecting[index] = is_member;

            let state = states.get(index).copied().unwrap_or(PageState::Unloaded);
            if is_member {
                match state {
                    PageState::Unloaded => update.to_render.push(page),
                    PageState::Failed if !was_member => update.to_render.push(page),
                    _ => {}
                }
            } else if state != PageState::Unloaded && !overlaps(top, bottom, keep_top, keep_bottom) {
                update.to_evict.push(page);
            }
        }

        if let Some(page) = centered_page(layout, scroll_y, viewport_height) {
            if page != self.current_page {
                self.current_page = page;
                update.current_page = Some(page);
            }
        }

        update
    }
}

/// Page with the largest overlap with the middle band of the viewport.
/// Earliest page wins ties; `None` when no page touches the band.
pub fn centered_page(layout: &PageLayout, scroll_y: f64, viewport_height: f64) -> Option<u32> {
    let band_top = scroll_y + viewport_height * (1.0 - CENTER_BAND) / 2.0;
    let band_bottom = band_top + viewport_height * CENTER_BAND;

    let mut best: Option<(u32, f64)> = None;
    for (page, top, bottom) in layout.spans() {
        if top >= band_bottom {
            break;
        }
        let overlap = bottom.min(band_bottom) - top.max(band_top);
        if overlap > 0.0 && best.map_or(true, |(_, b)| overlap > b) {
            best = Some((page, overlap));
        }
    }
    best.map(|(page, _)| page)
}

fn overlaps(top: f64, bottom: f64, range_top: f64, range_bottom: f64) -> bool {
    top < range_bottom && bottom > range_top
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PageGeometry;

    /// 10 pages, 400px tall at width 300, gap 0 -> page n spans [(n-1)*400, n*400)
    fn layout() -> PageLayout {
        let pages: Vec<PageGeometry> = (1..=10)
            .map(|number| PageGeometry {
                number,
                width: 600.0,
                height: 800.0,
            })
            .collect();
        PageLayout::new(&pages, 300.0, 0.0, 0.0)
    }

    fn unloaded() -> Vec<PageState> {
        vec![PageState::Unloaded; 10]
    }

    #[test]
    fn test_only_near_pages_render() {
        let mut controller = ViewportController::new(10, 100.0, 1000.0);
        let update = controller.update(&layout(), 0.0, 600.0, &unloaded());

        // viewport [0, 600] grown by 100 -> [-100, 700] touches pages 1-2
        assert_eq!(update.to_render, vec![1, 2]);
        assert!(update.to_evict.is_empty());
        for page in 3..=10 {
            assert!(!controller.is_intersecting(page));
        }
    }

    #[test]
    fn test_rendering_pages_are_not_reissued() {
        let mut controller = ViewportController::new(10, 0.0, 0.0);
        let mut states = unloaded();
        states[0] = PageState::Rendering;
        states[1] = PageState::Rendered;

        let update = controller.update(&layout(), 0.0, 600.0, &states);
        assert!(update.to_render.is_empty());
    }

    #[test]
    fn test_far_pages_are_evicted() {
        let mut controller = ViewportController::new(10, 100.0, 500.0);
        let mut states = unloaded();
        states[0] = PageState::Rendered;
        states[1] = PageState::Rendered;
        states[2] = PageState::Rendering;

        // viewport at page 8: [2800, 3400] grown to [2700, 3500]; keep range [2300, 3900]
        let update = controller.update(&layout(), 2800.0, 600.0, &states);
        assert_eq!(update.to_evict, vec![1, 2, 3]);
        assert_eq!(update.to_render, vec![7, 8, 9]);
    }

    #[test]
    fn test_pages_between_margins_are_kept() {
        let mut controller = ViewportController::new(10, 0.0, 1000.0);
        let mut states = unloaded();
        states[0] = PageState::Rendered;

        // Page 1 [0, 400] left the viewport [800, 1400] but is within the keep range
        let update = controller.update(&layout(), 800.0, 600.0, &states);
        assert!(update.to_evict.is_empty());
    }

    #[test]
    fn test_failed_page_retried_only_on_reentry() {
        let mut controller = ViewportController::new(10, 0.0, 10_000.0);
        let mut states = unloaded();
        controller.update(&layout(), 0.0, 600.0, &states);

        states[0] = PageState::Failed;
        let update = controller.update(&layout(), 10.0, 600.0, &states);
        assert!(!update.to_render.contains(&1));

        // Leave, then come back
        controller.update(&layout(), 2000.0, 600.0, &states);
        let update = controller.update(&layout(), 0.0, 600.0, &states);
        assert!(update.to_render.contains(&1));
    }

    #[test]
    fn test_current_page_follows_center_band() {
        let mut controller = ViewportController::new(10, 0.0, 0.0);
        assert_eq!(controller.current_page(), 1);

        // viewport [2400, 3000], band [2550, 2850] -> page 7 [2400, 2800] overlaps 250
        let update = controller.update(&layout(), 2400.0, 600.0, &unloaded());
        assert_eq!(update.current_page, Some(7));
        assert_eq!(controller.current_page(), 7);

        let update = controller.update(&layout(), 2410.0, 600.0, &unloaded());
        assert_eq!(update.current_page, None);
    }

    #[test]
    fn test_centered_page_prefers_larger_overlap() {
        // band [350, 650]: page 1 overlaps 50, page 2 overlaps 250
        assert_eq!(centered_page(&layout(), 200.0, 600.0), Some(2));
        // band exactly straddling pages 1 and 2 equally -> earliest wins
        assert_eq!(centered_page(&layout(), 100.0, 600.0), Some(1));
    }

    #[test]
    fn test_set_current_page_clamps() {
        let mut controller = ViewportController::new(10, 0.0, 0.0);
        assert_eq!(controller.set_current_page(0), 1);
        assert_eq!(controller.set_current_page(42), 10);
        assert_eq!(controller.set_current_page(5), 5);
    }
}
