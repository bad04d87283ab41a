//! Continuous-scroll page layout
//!
//! Pages are stacked vertically at a common width, separated by a gap.
//! All coordinates are layout pixels in document space (origin at the top
//! left of the scrollable content).

use crate::engine::PageGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(a: Point, b: Point) -> Point {
        Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }

    pub fn distance(a: Point, b: Point) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Scroll position of the scroll container
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

impl ScrollOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Vertical positions of every page at one page width
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    page_width: f64,
    padding: f64,
    gap: f64,
    tops: Vec<f64>,
    heights: Vec<f64>,
}

impl PageLayout {
    pub fn new(pages: &[PageGeometry], page_width: f64, gap: f64, padding: f64) -> Self {
        let mut tops = Vec::with_capacity(pages.len());
        let mut heights = Vec::with_capacity(pages.len());
        let mut cursor = gap;
        for page in pages {
            let height = page_width * page.aspect();
            tops.push(cursor);
            heights.push(height);
            cursor += height + gap;
        }
        Self {
            page_width,
            padding,
            gap,
            tops,
            heights,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.tops.len() as u32
    }

    /// Width every page is laid out at
    pub fn page_width(&self) -> f64 {
        self.page_width
    }

    /// Vertical gap above every page
    pub fn gap(&self) -> f64 {
        self.gap
    }

    /// Top edge of a 1-based page
    pub fn page_top(&self, page: u32) -> Option<f64> {
        self.index(page).map(|i| self.tops[i])
    }

    pub fn page_height(&self, page: u32) -> Option<f64> {
        self.index(page).map(|i| self.heights[i])
    }

    /// `(top, bottom)` of a 1-based page
    pub fn page_span(&self, page: u32) -> Option<(f64, f64)> {
        self.index(page).map(|i| (self.tops[i], self.tops[i] + self.heights[i]))
    }

    /// Iterate `(page, top, bottom)` in order
    pub fn spans(&self) -> impl Iterator<Item = (u32, f64, f64)> + '_ {
        self.tops
            .iter()
            .zip(&self.heights)
            .enumerate()
            .map(|(i, (top, height))| (i as u32 + 1, *top, top + height))
    }

    pub fn content_size(&self) -> Size {
        let height = match (self.tops.last(), self.heights.last()) {
            (Some(top), Some(height)) => top + height + self.gap,
            _ => self.gap,
        };
        Size::new(self.page_width + 2.0 * self.padding, height)
    }

    /// Largest scroll offset that keeps the viewport inside the content
    pub fn max_scroll(&self, viewport: Size) -> ScrollOffset {
        let content = self.content_size();
        ScrollOffset::new(
            (content.width - viewport.width).max(0.0),
            (content.height - viewport.height).max(0.0),
        )
    }

    /// Clamp a scroll offset into `[0, max_scroll]`
    pub fn clamp_scroll(&self, scroll: ScrollOffset, viewport: Size) -> ScrollOffset {
        let max = self.max_scroll(viewport);
        ScrollOffset::new(scroll.x.clamp(0.0, max.x), scroll.y.clamp(0.0, max.y))
    }

    fn index(&self, page: u32) -> Option<usize> {
        let index = page.checked_sub(1)? as usize;
        (index < self.tops.len()).then_some(index)
    }
}
