use anyhow::Context;
use report_view::ReportViewer;
use report_view::ViewerOptions;
use report_view::collaborators::StaticContext;
use report_view::collaborators::SystemClipboard;
use report_view::collaborators::SystemHandoff;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SAMPLE_REPORT: &str = r#"# Morning Report

Three things need attention today. Everything else is on track.

## Inbox

- Ann sent the Q3 numbers: revenue up 12%, churn flat.
- The vendor contract renewal is due Friday, see [the contract](https://example.com/contracts/acme-2026).

### Threads waiting on you

Two threads have been quiet for a week. Details at https://example.com/inbox/stale?days=7.

## Metrics

| Metric | Yesterday | Today |
|:--|--:|--:|
| Signups | 120 | 134 |
| Tickets | 18 | 11 |

```chart
type: bar
labels: Mon,Tue,Wed
data: 120,128,134
```

## Actions

- [Draft] Reply to Ann (thank her for the numbers and ask about churn by region)
- [Open] Contract (https://example.com/contracts/acme-2026)
- [Configure] Weekly digest delivery time
- [Play] Standup recording (~/Recordings/standup.m4a)
"#;

fn init_logging() -> anyhow::Result<()> {
    // Logging to stderr would draw over the alternate screen.
    let Some(path) = std::env::var_os("REPORT_VIEW_LOG") else {
        return Ok(());
    };
    let file = std::fs::File::create(&path)
        .with_context(|| format!("creating log file {}", path.to_string_lossy()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging()?;

    let markdown = match std::env::args().nth(1) {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("reading report {path}"))?
        }
        None => SAMPLE_REPORT.to_string(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;

    let cancel = CancellationToken::new();
    let viewer = ReportViewer::new(markdown.clone(), cancel.clone())
        .with_options(ViewerOptions::detect())
        .with_handoff(Arc::new(SystemHandoff))
        .with_clipboard(Arc::new(SystemClipboard::new()))
        .with_context(Arc::new(StaticContext::new(markdown)));

    let result = runtime.block_on(report_view::run(viewer, cancel.clone()));
    cancel.cancel();
    // Opens and drafts still in flight are abandoned.
    runtime.shutdown_background();
    result.context("running report viewer")
}
