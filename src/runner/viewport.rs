//! Scroll state of the runner area.
//!
//! Content is measured in rows. While the runners are shorter than the
//! viewport, empty space (the stretch) is placed above them so the controls
//! stay pinned to the bottom. Once they are taller, the view follows the
//! bottom edge.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewport {
    height: usize,
    content: usize,
    stretch: usize,
    offset: usize,
}

impl Viewport {
    pub fn new(height: usize) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn content(&self) -> usize {
        self.content
    }

    /// Empty rows rendered above the first runner.
    pub fn stretch(&self) -> usize {
        self.stretch
    }

    /// First content row shown at the top of the viewport.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn at_bottom(&self) -> bool {
        self.offset >= self.max_offset()
    }

    fn max_offset(&self) -> usize {
        self.content.saturating_sub(self.height)
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
    }

    /// Record the new content height and keep the bottom in view.
    ///
    /// With `only_down`, a view the user scrolled away from the bottom is
    /// left where it is unless everything fits.
    pub fn scroll_to_bottom(&mut self, content: usize, only_down: bool) {
        let was_at_bottom = self.at_bottom();
        self.content = content;
        let room = self.height.saturating_sub(content);
        self.stretch = room;
        if room > 0 || !only_down || was_at_bottom {
            self.offset = self.max_offset();
        } else {
            self.offset = self.offset.min(self.max_offset());
        }
    }

    /// User scrolling; positive moves towards the bottom.
    pub fn scroll_by(&mut self, delta: isize) {
        let target = self.offset as isize + delta;
        self.offset = target.clamp(0, self.max_offset() as isize) as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_padded_from_above() {
        let mut v = Viewport::new(20);
        v.scroll_to_bottom(5, false);
        assert_eq!(v.stretch(), 15);
        assert_eq!(v.offset(), 0);
    }

    #[test]
    fn tall_content_scrolls_to_bottom() {
        let mut v = Viewport::new(10);
        v.scroll_to_bottom(25, false);
        assert_eq!(v.stretch(), 0);
        assert_eq!(v.offset(), 15);
        assert!(v.at_bottom());
    }

    #[test]
    fn only_down_leaves_scrolled_back_view_alone() {
        let mut v = Viewport::new(10);
        v.scroll_to_bottom(25, false);
        v.scroll_by(-8);
        assert_eq!(v.offset(), 7);

        v.scroll_to_bottom(30, true);
        assert_eq!(v.offset(), 7);

        v.scroll_to_bottom(31, false);
        assert_eq!(v.offset(), 21);
    }

    #[test]
    fn only_down_follows_when_already_at_bottom() {
        let mut v = Viewport::new(10);
        v.scroll_to_bottom(12, false);
        v.scroll_to_bottom(14, true);
        assert_eq!(v.offset(), 4);
    }

    #[test]
    fn shrinking_content_clamps_offset() {
        let mut v = Viewport::new(10);
        v.scroll_to_bottom(40, false);
        v.scroll_by(-10);
        v.scroll_to_bottom(8, true);
        assert_eq!(v.offset(), 0);
        assert_eq!(v.stretch(), 2);
    }

    #[test]
    fn scroll_by_is_clamped() {
        let mut v = Viewport::new(10);
        v.scroll_to_bottom(15, false);
        v.scroll_by(-100);
        assert_eq!(v.offset(), 0);
        v.scroll_by(100);
        assert_eq!(v.offset(), 5);
    }
}
