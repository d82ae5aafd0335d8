//! `report-view` shows generated markdown reports in the terminal.
//!
//! The pipeline, leaf first:
//!
//! - [`structure`] pulls headings, action markers (`[Draft]`, `[Open]`, `[Configure]`, `[Play]`)
//!   and links out of the raw markdown.
//! - [`charts`] swaps chart directives for tokens before rendering and back afterwards.
//! - [`sections`] finds every heading in the rendered rows and keeps the collapsible view.
//! - [`overlay`] holds the actions and links pickers.
//! - [`effects`] turns a picked action into a status line or a background [`effects::Effect`].
//! - [`zones`] maps on-screen URL fragments back to full URLs for clicks and OSC 8 links.
//! - [`viewer::ReportViewer`] ties it together; [`runtime::run`] drives it in a real terminal.
//!
//! ```no_run
//! use report_view::ReportViewer;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), report_view::ViewerError> {
//! let cancel = CancellationToken::new();
//! let viewer = ReportViewer::new("# Weekly report\n\n## Findings\n\n[Open] Dashboard (https://example.com)\n", cancel.clone());
//! report_view::run(viewer, cancel).await
//! # }
//! ```
pub mod charts;
pub mod collaborators;
pub mod draft;
pub mod effects;
pub mod error;
pub mod overlay;
pub mod runtime;
pub mod sections;
pub mod structure;
pub mod viewer;
pub mod zones;

pub use error::CollaboratorError;
pub use error::EffectError;
pub use error::ViewerError;
pub use runtime::run;
pub use viewer::ReportViewer;
pub use viewer::ViewerMessage;
pub use viewer::ViewerOptions;
