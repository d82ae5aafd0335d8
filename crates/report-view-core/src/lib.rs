//! `report-view-core` holds the terminal-facing building blocks the report viewer is made of.
//!
//! - Input model ([`input`]) and the viewer's keyboard surface ([`keymap`]).
//! - Vertical viewport state and line drawing ([`viewport`], [`scroll`], [`render`]).
//! - Theming keyed by [`theme::StyleVariant`].
//! - A footer widget for key hints and transient status ([`help::HelpBar`]).
//!
//! Nothing here owns an event loop or an async runtime; the caller drives input and drawing.
pub mod theme;

#[cfg(feature = "crossterm")]
pub mod crossterm_input;

pub mod help;
pub mod input;
pub mod keymap;
pub mod render;
pub mod scroll;
pub mod viewport;
