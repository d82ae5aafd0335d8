use crate::viewport::ViewportState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollAction {
    Up,
    Down,
    PageUp,
    PageDown,
    Top,
    Bottom,
}

impl ScrollAction {
    /// Applies the action to `state`, moving `line_step` lines for single-line scrolls.
    pub fn apply(self, state: &mut ViewportState, line_step: i32) {
        match self {
            ScrollAction::Up => state.scroll_y_by(-line_step),
            ScrollAction::Down => state.scroll_y_by(line_step),
            ScrollAction::PageUp => state.page_up(),
            ScrollAction::PageDown => state.page_down(),
            ScrollAction::Top => state.to_top(),
            ScrollAction::Bottom => state.to_bottom(),
        }
    }

    /// Signed step for list-style navigation (overlays), `None` for page/jump actions.
    pub fn list_step(self) -> Option<isize> {
        match self {
            ScrollAction::Up => Some(-1),
            ScrollAction::Down => Some(1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_clamps_through_viewport() {
        let mut state = ViewportState::default();
        state.set_viewport(10, 5);
        state.set_content_height(20);

        ScrollAction::Down.apply(&mut state, 3);
        assert_eq!(state.y, 3);
        ScrollAction::Bottom.apply(&mut state, 1);
        assert_eq!(state.y, 15);
        ScrollAction::PageUp.apply(&mut state, 1);
        assert_eq!(state.y, 11);
        ScrollAction::Up.apply(&mut state, 50);
        assert_eq!(state.y, 0);
    }
}
