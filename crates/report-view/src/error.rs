use report_view_markdown::RenderError;

/// Failure reported by an external collaborator (handoff, clipboard, provider, context).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("failed to launch {what}: {reason}")]
    Launch { what: String, reason: String },
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("context unavailable: {0}")]
    Context(String),
    #[error("chart failed: {0}")]
    Chart(String),
    #[error("cancelled")]
    Cancelled,
}

/// Why a dispatched effect did not complete. Shown to the user as `Error: {self}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("draft cancelled")]
    Cancelled,
    #[error("generation returned an empty draft")]
    EmptyDraft,
    #[error("background task failed: {0}")]
    Join(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("terminal i/o: {0}")]
    Io(#[from] std::io::Error),
}
