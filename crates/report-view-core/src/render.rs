use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::Line;
use unicode_width::UnicodeWidthChar;

use crate::viewport::ViewportState;
use std::ops::Range;

const TAB_COLS: u16 = 4;

/// One-column scrollbar for `state`; the track stays blank when nothing scrolls.
pub fn render_scrollbar(area: Rect, buf: &mut Buffer, state: &ViewportState, style: Style) {
    buf.set_style(area, style);
    let thumb = scrollbar_thumb(area.height, state);
    for dy in 0..area.height {
        let on_thumb = thumb.as_ref().is_some_and(|t| t.contains(&dy));
        let symbol = if on_thumb { "█" } else { " " };
        buf.set_stringn(area.x, area.y + dy, symbol, 1, style);
    }
}

/// Track rows under the thumb, sized by the visible share of the content.
fn scrollbar_thumb(track: u16, state: &ViewportState) -> Option<Range<u16>> {
    if track == 0 || state.content_h <= state.viewport_h as u32 {
        return None;
    }
    let track = track as f64;
    let content = state.content_h as f64;
    let view = state.viewport_h as f64;
    let len = (view / content * track).round().clamp(1.0, track);
    let travel = track - len;
    let top = (state.y as f64 / (content - view).max(1.0) * travel)
        .round()
        .clamp(0.0, travel);
    Some(top as u16..(top + len) as u16)
}

fn put(buf: &mut Buffer, x: u16, y: u16, symbol: &str, style: Style) {
    if let Some(cell) = buf.cell_mut((x, y)) {
        cell.set_style(style);
        cell.set_symbol(symbol);
    }
}

/// Draws `line` starting at `(x, y)`, clipped to `max_cols` cells.
///
/// Spans without an explicit style fall back to `fallback_style`. Tabs expand to four spaces;
/// a wide char that would straddle the edge is dropped.
pub fn render_line_clipped(
    x: u16,
    y: u16,
    max_cols: u16,
    buf: &mut Buffer,
    line: &Line<'_>,
    fallback_style: Style,
) {
    let end = x.saturating_add(max_cols);
    let mut cx = x;
    let mut tmp = [0u8; 4];

    for span in &line.spans {
        let style = if span.style == Style::default() {
            fallback_style.patch(line.style)
        } else {
            line.style.patch(span.style)
        };
        for ch in span.content.chars() {
            if ch == '\t' {
                let cols = TAB_COLS.min(end - cx);
                for dx in 0..cols {
                    put(buf, cx + dx, y, " ", style);
                }
                cx += cols;
                if cols < TAB_COLS {
                    return;
                }
                continue;
            }

            let cols = UnicodeWidthChar::width(ch).unwrap_or(0) as u16;
            if cols == 0 {
                continue;
            }
            if cx.saturating_add(cols) > end {
                return;
            }
            put(buf, cx, y, ch.encode_utf8(&mut tmp), style);
            // Continuation cells of a wide char stay empty.
            for dx in 1..cols {
                put(buf, cx + dx, y, "", style);
            }
            cx += cols;
        }
    }
}

/// Wraps the already-drawn cells `x..x + cols` on row `y` in OSC 8 hyperlink escapes.
///
/// The displayed characters are left as they are; only the link target travels with them.
/// Cells are grouped in pairs so the escape bytes stay zero-width for the backend's diff, and
/// the terminator uses BEL because the `ESC \` form contains a printable backslash.
pub fn render_hyperlink(buf: &mut Buffer, x: u16, y: u16, cols: u16, url: &str) {
    if cols == 0 || url.is_empty() {
        return;
    }
    let end = x.saturating_add(cols);
    let mut cx = x;
    while cx < end {
        let mut text = String::new();
        let mut taken = 0u16;
        while taken < 2 && cx + taken < end {
            if let Some(cell) = buf.cell((cx + taken, y)) {
                text.push_str(cell.symbol());
            }
            taken += 1;
        }
        if text.is_empty() {
            break;
        }
        if let Some(cell) = buf.cell_mut((cx, y)) {
            cell.set_symbol(&format!("\x1b]8;;{url}\x07{text}\x1b]8;;\x07"));
        }
        cx += taken;
    }
}

/// Concatenated span contents of `line`.
pub fn line_plain(line: &Line<'_>) -> String {
    let mut out = String::new();
    for span in &line.spans {
        out.push_str(span.content.as_ref());
    }
    out
}

/// Cell column of byte offset `byte_idx` within `s`.
pub fn col_of_byte(s: &str, byte_idx: usize) -> usize {
    let end = byte_idx.min(s.len());
    s.char_indices()
        .take_while(|(i, _)| *i < end)
        .map(|(_, ch)| if ch == '\t' { 4 } else { UnicodeWidthChar::width(ch).unwrap_or(0) })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::text::Span;

    #[test]
    fn clipped_line_stops_at_width() {
        let area = Rect::new(0, 0, 4, 1);
        let mut buf = Buffer::empty(area);
        let line = Line::from(vec![Span::raw("ab"), Span::raw("cdef")]);
        render_line_clipped(0, 0, 3, &mut buf, &line, Style::default());
        assert_eq!(buf[(2, 0)].symbol(), "c");
        assert_eq!(buf[(3, 0)].symbol(), " ");
    }

    #[test]
    fn hyperlink_keeps_visible_text_in_cells() {
        let area = Rect::new(0, 0, 6, 1);
        let mut buf = Buffer::empty(area);
        buf.set_string(0, 0, "abc", Style::default());
        render_hyperlink(&mut buf, 0, 0, 3, "https://example.com/full");

        let first = buf[(0, 0)].symbol().to_string();
        assert!(first.starts_with("\x1b]8;;https://example.com/full\x07ab"));
        assert!(first.ends_with("\x1b]8;;\x07"));
        assert!(buf[(2, 0)].symbol().contains("\x07c\x1b"));
    }

    #[test]
    fn tab_is_clipped_at_the_edge() {
        let area = Rect::new(0, 0, 6, 1);
        let mut buf = Buffer::empty(area);
        render_line_clipped(0, 0, 3, &mut buf, &Line::from("a\tb"), Style::default());
        assert_eq!(buf[(2, 0)].symbol(), " ");
        assert_eq!(buf[(3, 0)].symbol(), " ");
        assert_eq!(buf[(5, 0)].symbol(), " ");
    }

    #[test]
    fn scrollbar_thumb_tracks_position() {
        let mut state = ViewportState::default();
        state.set_viewport(10, 4);
        state.set_content_height(16);
        assert_eq!(scrollbar_thumb(4, &state), Some(0..1));
        state.to_bottom();
        assert_eq!(scrollbar_thumb(4, &state), Some(3..4));
        state.set_content_height(3);
        assert_eq!(scrollbar_thumb(4, &state), None);
    }

    #[test]
    fn col_of_byte_counts_wide_chars() {
        assert_eq!(col_of_byte("你好x", "你好".len()), 4);
        assert_eq!(col_of_byte("abc", 1), 1);
    }
}
