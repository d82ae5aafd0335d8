//! Chart directives: fenced ```` ```chart ```` blocks are swapped for opaque tokens before
//! rendering and replaced by chart output afterwards.
use crate::error::CollaboratorError;
use ratatui::text::Line;
use ratatui::text::Span;
use report_view_core::render::line_plain;
use report_view_core::theme::Theme;
use std::collections::HashMap;

/// Inline image capability of the terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GraphicsTier {
    #[default]
    Text,
    Kitty,
    Iterm2,
    Sixel,
}

impl GraphicsTier {
    pub fn detect() -> Self {
        Self::detect_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn detect_from(env: impl Fn(&str) -> Option<String>) -> Self {
        let term = env("TERM").unwrap_or_default();
        let program = env("TERM_PROGRAM").unwrap_or_default();
        if env("KITTY_WINDOW_ID").is_some() || term.contains("kitty") || program == "ghostty" {
            return GraphicsTier::Kitty;
        }
        if matches!(program.as_str(), "iTerm.app" | "WezTerm")
            || env("LC_TERMINAL").is_some_and(|t| t == "iTerm2")
        {
            return GraphicsTier::Iterm2;
        }
        if term.contains("sixel") || term.starts_with("foot") || term.starts_with("mlterm") {
            return GraphicsTier::Sixel;
        }
        GraphicsTier::Text
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChartOutput {
    /// Text rendition (tables, sparklines) spliced in as rows.
    Lines(Vec<Line<'static>>),
    /// Terminal image escape occupying `rows` rows once drawn.
    Image { sequence: String, rows: u16 },
}

/// Plots a chart directive body for the given tier and width.
pub trait ChartRenderer: Send + Sync {
    fn render_chart(
        &self,
        spec: &str,
        tier: GraphicsTier,
        width: u16,
    ) -> Result<ChartOutput, CollaboratorError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartBlock {
    pub token: String,
    pub spec: String,
}

/// Markdown with chart blocks replaced by tokens, plus the blocks in document order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreparedMarkdown {
    pub markdown: String,
    pub charts: Vec<ChartBlock>,
}

/// An image chart waiting to be drawn, in rendered-row coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartImage {
    pub rendered_line: usize,
    pub rows: u16,
    pub sequence: String,
}

/// An image the runtime writes to the terminal after a frame, in screen coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePlacement {
    pub x: u16,
    pub y: u16,
    pub sequence: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Substituted {
    pub lines: Vec<Line<'static>>,
    pub images: Vec<ChartImage>,
}

fn chart_fence(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.chars().take_while(|c| *c == ch).count();
    if run < 3 {
        return None;
    }
    let info = trimmed[run..].split_whitespace().next()?;
    info.eq_ignore_ascii_case("chart").then_some((ch, run))
}

fn closes_fence(line: &str, fence: (char, usize)) -> bool {
    let trimmed = line.trim();
    let run = trimmed.chars().take_while(|c| *c == fence.0).count();
    run >= fence.1 && trimmed.chars().skip(run).all(char::is_whitespace)
}

/// Replaces every chart block with a token paragraph of the form `RVCHART<salt>N<index>X`.
///
/// The salt is bumped until no token prefix occurs in the source, so tokens never collide with
/// report text. Tokens are plain alphanumerics and survive rendering untouched.
pub fn prepare(markdown: &str) -> PreparedMarkdown {
    let mut salt = 0u32;
    while markdown.contains(&format!("RVCHART{salt}N")) {
        salt += 1;
    }

    let mut out = String::with_capacity(markdown.len());
    let mut charts = Vec::new();
    let mut lines = markdown.split_inclusive('\n');
    while let Some(line) = lines.next() {
        let Some(fence) = chart_fence(line) else {
            out.push_str(line);
            continue;
        };
        let mut spec = String::new();
        for body in lines.by_ref() {
            if closes_fence(body, fence) {
                break;
            }
            spec.push_str(body);
        }
        let token = format!("RVCHART{salt}N{}X", charts.len());
        out.push('\n');
        out.push_str(&token);
        out.push_str("\n\n");
        charts.push(ChartBlock {
            token,
            spec: spec.trim_end_matches('\n').to_string(),
        });
    }
    PreparedMarkdown {
        markdown: out,
        charts,
    }
}

/// Replaces each rendered row holding a chart token with the chart's output.
///
/// Without a chart renderer (or when it fails) the directive body is shown as muted text.
/// Charts whose token is missing from the rendered rows are omitted.
pub fn substitute(
    rendered: Vec<Line<'static>>,
    charts: &[ChartBlock],
    renderer: Option<&dyn ChartRenderer>,
    tier: GraphicsTier,
    width: u16,
    theme: &Theme,
) -> Substituted {
    if charts.is_empty() {
        return Substituted {
            lines: rendered,
            images: Vec::new(),
        };
    }
    let by_token: HashMap<&str, &ChartBlock> =
        charts.iter().map(|c| (c.token.as_str(), c)).collect();

    let mut out = Substituted::default();
    let mut placed = 0usize;
    for line in rendered {
        let plain = line_plain(&line);
        let Some(chart) = token_in(&plain).and_then(|t| by_token.get(t)) else {
            out.lines.push(line);
            continue;
        };
        placed += 1;
        let output = match renderer {
            Some(r) => r.render_chart(&chart.spec, tier, width).unwrap_or_else(|err| {
                log::warn!("chart {} failed, showing directive: {err}", chart.token);
                ChartOutput::Lines(raw_directive(&chart.spec, theme))
            }),
            None => ChartOutput::Lines(raw_directive(&chart.spec, theme)),
        };
        match output {
            ChartOutput::Lines(lines) => out.lines.extend(lines),
            ChartOutput::Image { sequence, rows } => {
                let rows = rows.max(1);
                out.images.push(ChartImage {
                    rendered_line: out.lines.len(),
                    rows,
                    sequence,
                });
                out.lines
                    .extend(std::iter::repeat_with(Line::default).take(rows as usize));
            }
        }
    }
    if placed < charts.len() {
        log::debug!(
            "{} chart token(s) not found after rendering",
            charts.len() - placed
        );
    }
    out
}

fn token_in(plain: &str) -> Option<&str> {
    let start = plain.find("RVCHART")?;
    let rest = &plain[start..];
    let end = rest.find('X')?;
    Some(&rest[..=end])
}

fn raw_directive(spec: &str, theme: &Theme) -> Vec<Line<'static>> {
    spec.lines()
        .map(|l| Line::from(Span::styled(l.to_string(), theme.text_muted)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Sales\n\n```chart\ntype: bar\ndata: 1,2,3\n```\n\nAfter.\n";

    struct Fixed(ChartOutput);

    impl ChartRenderer for Fixed {
        fn render_chart(
            &self,
            _spec: &str,
            _tier: GraphicsTier,
            _width: u16,
        ) -> Result<ChartOutput, CollaboratorError> {
            Ok(self.0.clone())
        }
    }

    fn rows(lines: &[&str]) -> Vec<Line<'static>> {
        lines.iter().map(|l| Line::from(l.to_string())).collect()
    }

    #[test]
    fn chart_blocks_become_token_paragraphs() {
        let p = prepare(DOC);
        assert_eq!(p.charts.len(), 1);
        assert_eq!(p.charts[0].token, "RVCHART0N0X");
        assert_eq!(p.charts[0].spec, "type: bar\ndata: 1,2,3");
        assert_eq!(p.markdown, "# Sales\n\n\nRVCHART0N0X\n\n\nAfter.\n");
    }

    #[test]
    fn salt_avoids_tokens_already_in_the_text() {
        let p = prepare("RVCHART0N9X is a word\n```chart\nx\n```\n");
        assert_eq!(p.charts[0].token, "RVCHART1N0X");
    }

    #[test]
    fn other_fences_are_untouched() {
        let md = "```rust\nfn main() {}\n```\n";
        assert_eq!(prepare(md).markdown, md);
    }

    #[test]
    fn without_renderer_the_directive_is_shown() {
        let p = prepare(DOC);
        let out = substitute(
            rows(&["Sales", "", "RVCHART0N0X", "", "After."]),
            &p.charts,
            None,
            GraphicsTier::Text,
            40,
            &Theme::default(),
        );
        let plain: Vec<String> = out.lines.iter().map(line_plain).collect();
        assert_eq!(plain, vec!["Sales", "", "type: bar", "data: 1,2,3", "", "After."]);
        assert!(out.images.is_empty());
    }

    #[test]
    fn image_output_reserves_rows() {
        let p = prepare(DOC);
        let renderer = Fixed(ChartOutput::Image {
            sequence: "\x1b_Gimg\x1b\\".into(),
            rows: 3,
        });
        let out = substitute(
            rows(&["Sales", "RVCHART0N0X", "After."]),
            &p.charts,
            Some(&renderer),
            GraphicsTier::Kitty,
            40,
            &Theme::default(),
        );
        assert_eq!(out.lines.len(), 5);
        assert_eq!(out.images[0].rendered_line, 1);
        assert_eq!(out.images[0].rows, 3);
        assert_eq!(line_plain(&out.lines[4]), "After.");
    }

    #[test]
    fn missing_tokens_are_silently_omitted() {
        let p = prepare(DOC);
        let renderer = Fixed(ChartOutput::Lines(rows(&["chart"])));
        let out = substitute(
            rows(&["Sales", "After."]),
            &p.charts,
            Some(&renderer),
            GraphicsTier::Text,
            40,
            &Theme::default(),
        );
        assert_eq!(out.lines.len(), 2);
    }

    #[test]
    fn tier_detection() {
        let env = |pairs: &'static [(&'static str, &'static str)]| {
            move |key: &str| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            }
        };
        assert_eq!(GraphicsTier::detect_from(env(&[("TERM", "xterm-kitty")])), GraphicsTier::Kitty);
        assert_eq!(
            GraphicsTier::detect_from(env(&[("TERM_PROGRAM", "iTerm.app")])),
            GraphicsTier::Iterm2
        );
        assert_eq!(GraphicsTier::detect_from(env(&[("TERM", "foot")])), GraphicsTier::Sixel);
        assert_eq!(GraphicsTier::detect_from(env(&[])), GraphicsTier::Text);
    }
}
