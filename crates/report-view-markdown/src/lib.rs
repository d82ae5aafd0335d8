//! Markdown rendering for the report viewer.
//!
//! The viewer only depends on the [`MarkdownRender`] seam: given markdown, a width and a style
//! variant it gets back [`StyledText`], one styled row per entry. [`MarkdownRenderer`] is the
//! pulldown-cmark based implementation and [`RendererCache`] keeps one renderer per
//! `(width, variant)` behind a lock.
use ratatui::text::Line;
use report_view_core::theme::StyleVariant;

mod cache;
mod render;

pub use cache::RenderKey;
pub use cache::RendererCache;
pub use render::MarkdownRenderer;
pub use render::RenderOptions;

/// Rendered output: a sequence of display rows.
///
/// Row `i` of the styled text corresponds to row `i` of the plain text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyledText {
    lines: Vec<Line<'static>>,
}

impl StyledText {
    pub fn new(lines: Vec<Line<'static>>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[Line<'static>] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<Line<'static>> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl From<Vec<Line<'static>>> for StyledText {
    fn from(lines: Vec<Line<'static>>) -> Self {
        Self::new(lines)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot render at width 0")]
    ZeroWidth,
    #[error("renderer failed: {0}")]
    Renderer(String),
}

/// Anything that turns markdown into styled rows.
///
/// Implementations must be deterministic for identical inputs and keep heading text verbatim
/// (inline markup removed) in the plain rows.
pub trait MarkdownRender: Send + Sync {
    fn render(
        &self,
        markdown: &str,
        width: u16,
        variant: StyleVariant,
    ) -> Result<StyledText, RenderError>;
}

impl MarkdownRender for MarkdownRenderer {
    fn render(
        &self,
        markdown: &str,
        width: u16,
        variant: StyleVariant,
    ) -> Result<StyledText, RenderError> {
        if width == self.width() && variant == self.variant() {
            MarkdownRenderer::render(self, markdown)
        } else {
            MarkdownRenderer::new(width, variant).render(markdown)
        }
    }
}
