//! Actions and links overlays: bounded list cursors plus the popup that draws them.
use crate::structure::Action;
use crate::structure::LinkEntry;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::widgets::Block;
use ratatui::widgets::Borders;
use ratatui::widgets::Clear;
use ratatui::widgets::Widget;
use report_view_core::render::render_line_clipped;
use report_view_core::theme::Theme;

/// Index into a list of `len` items. Moves clamp at both ends; there is no wraparound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListCursor {
    selected: usize,
    len: usize,
}

impl ListCursor {
    /// `None` for an empty list, which cannot be opened.
    pub fn new(len: usize) -> Option<Self> {
        (len > 0).then_some(Self { selected: 0, len })
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Number of items; never zero.
    pub fn count(&self) -> usize {
        self.len
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        self.selected = (self.selected + 1).min(self.len.saturating_sub(1));
    }

    pub fn move_by(&mut self, delta: isize) {
        let target = self.selected as isize + delta;
        self.selected = target.clamp(0, self.len.saturating_sub(1) as isize) as usize;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverlayState {
    #[default]
    Closed,
    Actions(ListCursor),
    Links(ListCursor),
}

impl OverlayState {
    pub fn is_open(&self) -> bool {
        !matches!(self, OverlayState::Closed)
    }

    pub fn cursor_mut(&mut self) -> Option<&mut ListCursor> {
        match self {
            OverlayState::Closed => None,
            OverlayState::Actions(c) | OverlayState::Links(c) => Some(c),
        }
    }
}

/// Why an overlay did not open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenRefusal {
    Empty,
    AnotherOpen,
    Busy,
}

/// What committing the selected overlay row asks the viewer to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverlayCommit {
    RunAction(Action),
    CopyLink(LinkEntry),
}

pub fn open_actions(
    state: &mut OverlayState,
    actions: &[Action],
    busy: bool,
) -> Result<(), OpenRefusal> {
    open_with(state, actions.len(), busy, OverlayState::Actions)
}

pub fn open_links(
    state: &mut OverlayState,
    links: &[LinkEntry],
    busy: bool,
) -> Result<(), OpenRefusal> {
    open_with(state, links.len(), busy, OverlayState::Links)
}

fn open_with(
    state: &mut OverlayState,
    len: usize,
    busy: bool,
    wrap: fn(ListCursor) -> OverlayState,
) -> Result<(), OpenRefusal> {
    if busy {
        return Err(OpenRefusal::Busy);
    }
    if state.is_open() {
        return Err(OpenRefusal::AnotherOpen);
    }
    let cursor = ListCursor::new(len).ok_or(OpenRefusal::Empty)?;
    *state = wrap(cursor);
    Ok(())
}

/// Closes the overlay and returns what its selected row stands for.
pub fn commit(
    state: &mut OverlayState,
    actions: &[Action],
    links: &[LinkEntry],
) -> Option<OverlayCommit> {
    let out = match *state {
        OverlayState::Closed => None,
        OverlayState::Actions(c) => actions
            .get(c.selected())
            .cloned()
            .map(OverlayCommit::RunAction),
        OverlayState::Links(c) => links.get(c.selected()).cloned().map(OverlayCommit::CopyLink),
    };
    *state = OverlayState::Closed;
    out
}

/// Row text for the actions overlay.
pub fn action_row(action: &Action) -> String {
    if action.target.is_empty() {
        format!("[{}] {}", action.kind, action.description)
    } else {
        format!("[{}] {} ({})", action.kind, action.description, action.target)
    }
}

pub fn link_row(link: &LinkEntry) -> String {
    if link.label == link.url {
        link.url.clone()
    } else {
        format!("{} — {}", link.label, link.url)
    }
}

/// Centered bordered popup listing `rows`, keeping the selected row in view.
pub fn render_popup(
    area: Rect,
    buf: &mut Buffer,
    title: &str,
    rows: &[String],
    selected: usize,
    theme: &Theme,
) {
    let popup = popup_area(area, rows.len());
    if popup.width < 4 || popup.height < 3 {
        return;
    }
    Clear.render(popup, buf);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border)
        .title(Span::styled(format!(" {title} "), theme.heading));
    let inner = block.inner(popup);
    block.render(popup, buf);

    let height = inner.height as usize;
    let first = selected.saturating_sub(height.saturating_sub(1));
    for (i, row) in rows.iter().enumerate().skip(first).take(height) {
        let y = inner.y + (i - first) as u16;
        let style = if i == selected {
            theme.selected
        } else {
            theme.text_primary
        };
        let marker = if i == selected { "› " } else { "  " };
        let line = Line::from(vec![Span::styled(marker, style), Span::styled(row.clone(), style)]);
        if i == selected {
            buf.set_style(Rect::new(inner.x, y, inner.width, 1), style);
        }
        render_line_clipped(inner.x, y, inner.width, buf, &line, Style::default());
    }
}

fn popup_area(area: Rect, rows: usize) -> Rect {
    let width = (area.width.saturating_mul(4) / 5).max(area.width.min(20));
    let height = (rows as u16).saturating_add(2).min(area.height.saturating_sub(2).max(3));
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::ActionKind;

    fn action(desc: &str) -> Action {
        Action {
            kind: ActionKind::Configure,
            description: desc.into(),
            target: String::new(),
        }
    }

    #[test]
    fn cursor_clamps_without_wrapping() {
        let mut c = ListCursor::new(3).expect("non-empty");
        c.move_up();
        assert_eq!(c.selected(), 0);
        c.move_down();
        c.move_down();
        c.move_down();
        assert_eq!(c.selected(), 2);
        c.move_by(-10);
        assert_eq!(c.selected(), 0);
        assert!(ListCursor::new(0).is_none());
    }

    #[test]
    fn empty_lists_do_not_open() {
        let mut state = OverlayState::Closed;
        assert_eq!(open_actions(&mut state, &[], false), Err(OpenRefusal::Empty));
        assert_eq!(state, OverlayState::Closed);
    }

    #[test]
    fn only_one_overlay_at_a_time() {
        let mut state = OverlayState::Closed;
        let links = vec![LinkEntry {
            url: "https://x.io".into(),
            label: "x".into(),
        }];
        open_actions(&mut state, &[action("a")], false).expect("opens");
        assert_eq!(open_links(&mut state, &links, false), Err(OpenRefusal::AnotherOpen));
        assert!(matches!(state, OverlayState::Actions(_)));
    }

    #[test]
    fn busy_blocks_opening() {
        let mut state = OverlayState::Closed;
        assert_eq!(open_actions(&mut state, &[action("a")], true), Err(OpenRefusal::Busy));
    }

    #[test]
    fn commit_returns_selection_and_closes() {
        let mut state = OverlayState::Closed;
        let actions = vec![action("a"), action("b")];
        open_actions(&mut state, &actions, false).expect("opens");
        if let Some(c) = state.cursor_mut() {
            c.move_down();
        }
        assert_eq!(
            commit(&mut state, &actions, &[]),
            Some(OverlayCommit::RunAction(action("b")))
        );
        assert_eq!(state, OverlayState::Closed);
    }

    #[test]
    fn popup_draws_selected_row() {
        let area = Rect::new(0, 0, 40, 10);
        let mut buf = Buffer::empty(area);
        let rows = vec!["first".to_string(), "second".to_string()];
        render_popup(area, &mut buf, "Actions", &rows, 1, &Theme::default());
        let text: String = (0..area.height)
            .map(|y| {
                (0..area.width)
                    .map(|x| buf[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n");
        assert!(text.contains("› second"));
        assert!(text.contains("  first"));
        assert!(text.contains("Actions"));
    }
}
