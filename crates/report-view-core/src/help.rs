use crate::keymap::Binding;
use crate::render;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use unicode_width::UnicodeWidthStr;

#[derive(Clone, Debug)]
pub struct HelpBarOptions {
    pub style: Style,
    pub key_style: Style,
    pub separator: String,
    pub space: String,
}

impl Default for HelpBarOptions {
    fn default() -> Self {
        Self {
            style: Style::default(),
            key_style: Style::default(),
            separator: " • ".to_string(),
            space: " ".to_string(),
        }
    }
}

/// One-line footer: key hints on the left, an optional status message on the right.
///
/// When both do not fit, the status wins and the hints are clipped.
#[derive(Clone, Debug, Default)]
pub struct HelpBar {
    bindings: Vec<Binding>,
    options: HelpBarOptions,
}

impl HelpBar {
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self {
            bindings,
            options: HelpBarOptions::default(),
        }
    }

    pub fn with_options(bindings: Vec<Binding>, options: HelpBarOptions) -> Self {
        Self { bindings, options }
    }

    pub fn set_bindings(&mut self, bindings: Vec<Binding>) {
        self.bindings = bindings;
    }

    /// Draws the hints, then the status flush right. The status is never clipped by the hints.
    pub fn render_ref(&self, area: Rect, buf: &mut Buffer, status: Option<Span<'static>>) {
        if area.is_empty() {
            return;
        }
        let style = self.options.style;
        buf.set_style(area, style);

        let mut hints_cols = area.width;
        if let Some(status) = status {
            let cols = (UnicodeWidthStr::width(status.content.as_ref()) as u16).min(area.width);
            if cols > 0 {
                hints_cols = area.width.saturating_sub(cols + 1);
                let line = Line::from(status);
                render::render_line_clipped(area.right() - cols, area.y, cols, buf, &line, style);
            }
        }

        let hints = Line::from(self.hint_spans());
        render::render_line_clipped(area.x, area.y, hints_cols, buf, &hints, style);
    }

    fn hint_spans(&self) -> Vec<Span<'static>> {
        let o = &self.options;
        self.bindings
            .iter()
            .enumerate()
            .flat_map(|(i, b)| {
                let separator = (i > 0).then(|| Span::styled(o.separator.clone(), o.style));
                separator.into_iter().chain([
                    Span::styled(b.help_key.clone(), o.key_style),
                    Span::styled(o.space.clone(), o.style),
                    Span::styled(b.help_desc.clone(), o.style),
                ])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap;

    #[test]
    fn hints_are_clipped_to_narrow_width() {
        let hb = HelpBar::new(vec![
            keymap::Binding::new("q", "quit", vec![keymap::key_char('q')]),
            keymap::Binding::new("n", "next", vec![keymap::key_char('n')]),
        ]);
        let area = Rect::new(0, 0, 8, 1);
        let mut buf = Buffer::empty(area);
        hb.render_ref(area, &mut buf, None);
        let row: String = (0..8).map(|x| buf[(x, 0)].symbol().to_string()).collect();
        assert_eq!(row, "q quit •");
    }

    #[test]
    fn status_is_right_aligned() {
        let hb = HelpBar::new(vec![keymap::Binding::new(
            "q",
            "quit",
            vec![keymap::key_char('q')],
        )]);
        let area = Rect::new(0, 0, 20, 1);
        let mut buf = Buffer::empty(area);
        hb.render_ref(area, &mut buf, Some(Span::raw("done")));
        assert_eq!(buf[(16, 0)].symbol(), "d");
        assert_eq!(buf[(19, 0)].symbol(), "e");
        assert_eq!(buf[(0, 0)].symbol(), "q");
    }
}
