use ratatui::style::Color;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::style::Stylize;

/// Terminal background flavour a report is rendered for.
///
/// Part of the renderer cache key, so it stays a small `Copy` value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StyleVariant {
    #[default]
    Dark,
    Light,
    /// No colors, only modifiers. Used when output is not a color terminal.
    Plain,
}

#[derive(Clone, Debug)]
pub struct Theme {
    pub text_primary: Style,
    pub text_muted: Style,
    pub heading: Style,
    pub heading_top: Style,
    pub accent: Style,
    pub danger: Style,
    pub code_inline: Style,
    pub selected: Style,
    pub border: Style,
    pub status: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self::for_variant(StyleVariant::default())
    }
}

impl Theme {
    pub fn for_variant(variant: StyleVariant) -> Self {
        match variant {
            StyleVariant::Dark => Self {
                text_primary: Style::default(),
                text_muted: Style::default().dark_gray(),
                heading: Style::default().light_cyan().add_modifier(Modifier::BOLD),
                heading_top: Style::default()
                    .fg(Color::Black)
                    .bg(Color::LightCyan)
                    .add_modifier(Modifier::BOLD),
                accent: Style::default().cyan(),
                danger: Style::default().red(),
                code_inline: Style::default().yellow(),
                selected: Style::default().add_modifier(Modifier::REVERSED),
                border: Style::default().dark_gray(),
                status: Style::default().gray(),
            },
            StyleVariant::Light => Self {
                text_primary: Style::default(),
                text_muted: Style::default().gray(),
                heading: Style::default().blue().add_modifier(Modifier::BOLD),
                heading_top: Style::default()
                    .fg(Color::White)
                    .bg(Color::Blue)
                    .add_modifier(Modifier::BOLD),
                accent: Style::default().blue(),
                danger: Style::default().red(),
                code_inline: Style::default().magenta(),
                selected: Style::default().add_modifier(Modifier::REVERSED),
                border: Style::default().gray(),
                status: Style::default().dark_gray(),
            },
            StyleVariant::Plain => Self {
                text_primary: Style::default(),
                text_muted: Style::default().add_modifier(Modifier::DIM),
                heading: Style::default().add_modifier(Modifier::BOLD),
                heading_top: Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                accent: Style::default().add_modifier(Modifier::UNDERLINED),
                danger: Style::default().add_modifier(Modifier::BOLD),
                code_inline: Style::default(),
                selected: Style::default().add_modifier(Modifier::REVERSED),
                border: Style::default(),
                status: Style::default(),
            },
        }
    }
}
