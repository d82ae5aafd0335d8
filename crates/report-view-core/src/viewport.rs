use crate::render;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::Line;
use std::ops::Range;

/// Vertical scroll state over a list of already-wrapped lines.
///
/// Content is wrapped to the viewport width before it gets here, so there is no horizontal axis.
#[derive(Clone, Copy, Debug, Default)]
pub struct ViewportState {
    pub y: u32,
    pub viewport_w: u16,
    pub viewport_h: u16,
    pub content_h: u32,
}

impl ViewportState {
    pub fn set_viewport(&mut self, w: u16, h: u16) {
        self.viewport_w = w;
        self.viewport_h = h;
        self.clamp();
    }

    pub fn set_content_height(&mut self, h: u32) {
        self.content_h = h;
        self.clamp();
    }

    pub fn clamp(&mut self) {
        self.y = self.y.min(self.max_y());
    }

    pub fn scroll_y_by(&mut self, delta: i32) {
        let next = self.y as i64 + delta as i64;
        self.y = next.clamp(0, self.max_y() as i64) as u32;
    }

    /// Puts `line` at the top of the viewport (clamped to the scrollable range).
    pub fn scroll_to(&mut self, line: u32) {
        self.y = line.min(self.max_y());
    }

    /// Scrolls the minimum amount needed for `line` to be on screen.
    pub fn ensure_visible(&mut self, line: u32) {
        if line < self.y {
            self.y = line;
        } else if self.viewport_h > 0 && line >= self.y + self.viewport_h as u32 {
            self.y = line + 1 - self.viewport_h as u32;
        }
        self.clamp();
    }

    pub fn page_down(&mut self) {
        self.scroll_y_by(self.viewport_h.saturating_sub(1) as i32);
    }

    pub fn page_up(&mut self) {
        self.scroll_y_by(-(self.viewport_h.saturating_sub(1) as i32));
    }

    pub fn to_top(&mut self) {
        self.y = 0;
    }

    pub fn to_bottom(&mut self) {
        self.y = self.max_y();
    }

    /// Content line indices currently on screen.
    pub fn visible_range(&self) -> Range<usize> {
        let start = self.y as usize;
        let end = (self.y as usize + self.viewport_h as usize).min(self.content_h as usize);
        start..end.max(start)
    }

    pub fn percent_y(&self) -> Option<u8> {
        if self.content_h == 0 || self.viewport_h == 0 || self.content_h <= self.viewport_h as u32 {
            return None;
        }
        let visible_bottom = self.y.saturating_add(self.viewport_h as u32) as f64;
        let pct = (visible_bottom / self.content_h as f64 * 100.0).round();
        Some(pct.clamp(0.0, 100.0) as u8)
    }

    fn max_y(&self) -> u32 {
        self.content_h.saturating_sub(self.viewport_h as u32)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ViewportOptions {
    pub style: Style,
    pub show_scrollbar: bool,
    pub scrollbar_style: Style,
}

/// Splits `area` into the text column and the optional one-cell scrollbar column.
pub fn split_scrollbar(area: Rect, show_scrollbar: bool) -> (Rect, Option<Rect>) {
    if show_scrollbar && area.width >= 2 {
        (
            Rect::new(area.x, area.y, area.width - 1, area.height),
            Some(Rect::new(area.x + area.width - 1, area.y, 1, area.height)),
        )
    } else {
        (area, None)
    }
}

/// Draws the on-screen slice of `lines` plus an optional scrollbar.
pub fn render_lines(
    area: Rect,
    buf: &mut Buffer,
    lines: &[Line<'static>],
    state: &ViewportState,
    options: &ViewportOptions,
) {
    if area.width == 0 || area.height == 0 {
        return;
    }

    let (text_area, scrollbar) = split_scrollbar(area, options.show_scrollbar);

    for row in 0..text_area.height {
        let y = row + text_area.y;
        let idx = (state.y as usize).saturating_add(row as usize);
        buf.set_style(Rect::new(text_area.x, y, text_area.width, 1), options.style);
        if let Some(line) = lines.get(idx) {
            render::render_line_clipped(text_area.x, y, text_area.width, buf, line, options.style);
        }
    }

    if let Some(sb) = scrollbar {
        render::render_scrollbar(sb, buf, state, options.scrollbar_style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_clamps_to_content() {
        let mut s = ViewportState::default();
        s.set_viewport(10, 5);
        s.set_content_height(6);
        s.y = 99;
        s.clamp();
        assert_eq!(s.y, 1);
    }

    #[test]
    fn ensure_visible_scrolls_minimally() {
        let mut s = ViewportState::default();
        s.set_viewport(10, 5);
        s.set_content_height(100);
        s.ensure_visible(12);
        assert_eq!(s.y, 8);
        s.ensure_visible(10);
        assert_eq!(s.y, 8);
        s.ensure_visible(3);
        assert_eq!(s.y, 3);
    }

    #[test]
    fn visible_range_stops_at_content_end() {
        let mut s = ViewportState::default();
        s.set_viewport(10, 5);
        s.set_content_height(3);
        assert_eq!(s.visible_range(), 0..3);
    }

    #[test]
    fn renders_only_visible_slice() {
        let lines: Vec<Line<'static>> = (0..10).map(|i| Line::from(format!("line {i}"))).collect();
        let mut state = ViewportState::default();
        state.set_viewport(10, 2);
        state.set_content_height(lines.len() as u32);
        state.scroll_to(4);

        let area = Rect::new(0, 0, 10, 2);
        let mut buf = Buffer::empty(area);
        render_lines(area, &mut buf, &lines, &state, &ViewportOptions::default());
        assert_eq!(buf[(0, 0)].symbol(), "l");
        assert_eq!(buf[(5, 0)].symbol(), "4");
        assert_eq!(buf[(5, 1)].symbol(), "5");
    }
}
