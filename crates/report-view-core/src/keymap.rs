use crate::input::KeyCode;
use crate::input::KeyEvent;
use crate::input::KeyModifiers;
use crate::scroll::ScrollAction;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub keys: Vec<KeyEvent>,
    pub help_key: String,
    pub help_desc: String,
}

impl Binding {
    pub fn new(
        help_key: impl Into<String>,
        help_desc: impl Into<String>,
        keys: Vec<KeyEvent>,
    ) -> Self {
        Self {
            keys,
            help_key: help_key.into(),
            help_desc: help_desc.into(),
        }
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.keys.iter().any(|k| key_event_matches(k, event))
    }
}

/// Character keys already encode shift in the character itself (`G` vs `g`), so shift is
/// ignored for them. Everything else needs exact modifiers.
pub fn key_event_matches(pattern: &KeyEvent, event: &KeyEvent) -> bool {
    if pattern.code != event.code {
        return false;
    }
    let (p, e) = (pattern.modifiers, event.modifiers);
    match pattern.code {
        KeyCode::Char(_) => p.ctrl == e.ctrl && p.alt == e.alt,
        _ => p == e,
    }
}

pub fn key_char(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c))
}

pub fn key_ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c)).with_modifiers(KeyModifiers::ctrl())
}

pub fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code)
}

/// Everything the viewer's keyboard surface can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerCommand {
    Quit,
    NextSection,
    PrevSection,
    ToggleSection,
    CollapseAll,
    ExpandAll,
    OpenActions,
    OpenLinks,
    CloseOverlay,
    Execute,
    Scroll(ScrollAction),
}

/// Which key table applies: the document itself, or an open list overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyContext {
    Document,
    Overlay,
}

#[derive(Clone, Debug)]
pub struct ViewerKeymap {
    pub document: Vec<(ViewerCommand, Binding)>,
    pub overlay: Vec<(ViewerCommand, Binding)>,
}

impl Default for ViewerKeymap {
    fn default() -> Self {
        use ViewerCommand as C;

        let quit = Binding::new("q", "quit", vec![key_char('q')]);
        let down = Binding::new("j/↓", "down", vec![key(KeyCode::Down), key_char('j')]);
        let up = Binding::new("k/↑", "up", vec![key(KeyCode::Up), key_char('k')]);
        let page_down = Binding::new(
            "pgdn",
            "page down",
            vec![key(KeyCode::PageDown), key_ctrl('d')],
        );
        let page_up = Binding::new("pgup", "page up", vec![key(KeyCode::PageUp), key_ctrl('u')]);
        let top = Binding::new("g", "top", vec![key(KeyCode::Home), key_char('g')]);
        let bottom = Binding::new("G", "bottom", vec![key(KeyCode::End), key_char('G')]);

        Self {
            document: vec![
                (C::Quit, quit.clone()),
                (
                    C::NextSection,
                    Binding::new("n", "next", vec![key_char('n'), key(KeyCode::Tab)]),
                ),
                (
                    C::PrevSection,
                    Binding::new("N", "prev", vec![key_char('N'), key(KeyCode::BackTab)]),
                ),
                (
                    C::ToggleSection,
                    Binding::new(
                        "space",
                        "fold",
                        vec![key_char(' '), key(KeyCode::Enter)],
                    ),
                ),
                (
                    C::CollapseAll,
                    Binding::new("c", "fold all", vec![key_char('c')]),
                ),
                (
                    C::ExpandAll,
                    Binding::new("e", "unfold all", vec![key_char('e')]),
                ),
                (
                    C::OpenActions,
                    Binding::new("a", "actions", vec![key_char('a')]),
                ),
                (C::OpenLinks, Binding::new("L", "links", vec![key_char('L')])),
                (C::Scroll(ScrollAction::Down), down.clone()),
                (C::Scroll(ScrollAction::Up), up.clone()),
                (C::Scroll(ScrollAction::PageDown), page_down.clone()),
                (C::Scroll(ScrollAction::PageUp), page_up.clone()),
                (C::Scroll(ScrollAction::Top), top.clone()),
                (C::Scroll(ScrollAction::Bottom), bottom.clone()),
            ],
            overlay: vec![
                (C::Quit, quit),
                (C::Scroll(ScrollAction::Down), down),
                (C::Scroll(ScrollAction::Up), up),
                (
                    C::Execute,
                    Binding::new("enter", "run", vec![key(KeyCode::Enter)]),
                ),
                (
                    C::CloseOverlay,
                    Binding::new("esc", "close", vec![key(KeyCode::Esc)]),
                ),
                (C::Scroll(ScrollAction::PageDown), page_down),
                (C::Scroll(ScrollAction::PageUp), page_up),
                (C::Scroll(ScrollAction::Top), top),
                (C::Scroll(ScrollAction::Bottom), bottom),
            ],
        }
    }
}

impl ViewerKeymap {
    /// Resolves `key` against the table for `context`. `Ctrl-C` always maps to [`ViewerCommand::Quit`].
    pub fn command_for(&self, context: KeyContext, key: &KeyEvent) -> Option<ViewerCommand> {
        if key.is_interrupt() {
            return Some(ViewerCommand::Quit);
        }
        self.table(context)
            .iter()
            .find(|(_, binding)| binding.matches(key))
            .map(|(command, _)| *command)
    }

    pub fn is_quit(&self, context: KeyContext, key: &KeyEvent) -> bool {
        self.command_for(context, key) == Some(ViewerCommand::Quit)
    }

    /// Bindings shown in the help bar for `context`, in table order.
    pub fn help_bindings(&self, context: KeyContext) -> Vec<Binding> {
        self.table(context)
            .iter()
            .filter(|(command, _)| {
                !matches!(
                    command,
                    ViewerCommand::Scroll(ScrollAction::PageUp | ScrollAction::Top)
                )
            })
            .map(|(_, binding)| binding.clone())
            .collect()
    }

    fn table(&self, context: KeyContext) -> &[(ViewerCommand, Binding)] {
        match context {
            KeyContext::Document => &self.document,
            KeyContext::Overlay => &self.overlay,
        }
    }
}
