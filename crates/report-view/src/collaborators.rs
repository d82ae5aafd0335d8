//! Seams to the outside world, and the implementations that ship with the viewer.
//!
//! Handoff and clipboard calls are synchronous and are run on a blocking thread by the effect
//! runner; generation and context gathering are async and object safe through [`BoxFuture`].
use crate::error::CollaboratorError;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Hands targets to other applications. Every call returns once the launch was attempted.
pub trait Handoff: Send + Sync {
    fn open_url(&self, url: &str) -> Result<(), CollaboratorError>;
    fn open_file(&self, path: &str) -> Result<(), CollaboratorError>;
    fn open_mailto(&self, to: &str, subject: &str, body: &str) -> Result<(), CollaboratorError>;
    fn play_media(&self, path: &str) -> Result<(), CollaboratorError>;
}

pub trait Clipboard: Send + Sync {
    fn copy(&self, text: &str) -> Result<(), CollaboratorError>;
}

/// Text generation backend used to draft replies.
pub trait GenerationProvider: Send + Sync {
    fn complete<'a>(
        &'a self,
        cancel: CancellationToken,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, CollaboratorError>>;
}

/// Supplies background text for a draft, at most `max_units` characters of it.
pub trait ContextSource: Send + Sync {
    fn gather(&self, max_units: usize) -> BoxFuture<'_, Result<String, CollaboratorError>>;
}

/// Opens URLs, files and media with the platform's default handler (`open` crate).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHandoff;

impl SystemHandoff {
    fn launch(what: &str, target: &str) -> Result<(), CollaboratorError> {
        log::info!("handing off {what}: {target}");
        open::that_detached(target).map_err(|e| CollaboratorError::Launch {
            what: what.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Handoff for SystemHandoff {
    fn open_url(&self, url: &str) -> Result<(), CollaboratorError> {
        let url = if url.starts_with("www.") {
            format!("https://{url}")
        } else {
            url.to_string()
        };
        Self::launch("url", &url)
    }

    fn open_file(&self, path: &str) -> Result<(), CollaboratorError> {
        Self::launch("file", &expand_home(path))
    }

    fn open_mailto(&self, to: &str, subject: &str, body: &str) -> Result<(), CollaboratorError> {
        Self::launch("mail", &mailto_url(to, subject, body))
    }

    fn play_media(&self, path: &str) -> Result<(), CollaboratorError> {
        Self::launch("media", &expand_home(path))
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => format!("{}/{rest}", home.to_string_lossy()),
        _ => path.to_string(),
    }
}

/// `mailto:` URL with percent-encoded subject and body (spaces as `%20`, not `+`).
pub fn mailto_url(to: &str, subject: &str, body: &str) -> String {
    let encode = |s: &str| -> String {
        url::form_urlencoded::byte_serialize(s.as_bytes())
            .collect::<String>()
            .replace('+', "%20")
    };
    let mut out = format!("mailto:{}", to.trim());
    let mut sep = '?';
    if !subject.is_empty() {
        out.push(sep);
        out.push_str("subject=");
        out.push_str(&encode(subject));
        sep = '&';
    }
    if !body.is_empty() {
        out.push(sep);
        out.push_str("body=");
        out.push_str(&encode(body));
    }
    out
}

/// System clipboard through `arboard`. The handle is created on first use and kept alive, since
/// on some platforms dropping it drops the copied contents.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Mutex<Option<arboard::Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for SystemClipboard {
    fn copy(&self, text: &str) -> Result<(), CollaboratorError> {
        let mut guard = self.inner.lock();
        if guard.is_none() {
            let clipboard =
                arboard::Clipboard::new().map_err(|e| CollaboratorError::Clipboard(e.to_string()))?;
            *guard = Some(clipboard);
        }
        let Some(clipboard) = guard.as_mut() else {
            return Err(CollaboratorError::Clipboard("not initialized".to_string()));
        };
        clipboard
            .set_text(text.to_string())
            .map_err(|e| CollaboratorError::Clipboard(e.to_string()))
    }
}

/// Fixed context text, cut to the requested budget.
#[derive(Clone, Debug, Default)]
pub struct StaticContext {
    text: String,
}

impl StaticContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl ContextSource for StaticContext {
    fn gather(&self, max_units: usize) -> BoxFuture<'_, Result<String, CollaboratorError>> {
        let text: String = self.text.chars().take(max_units).collect();
        async move { Ok(text) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailto_encodes_spaces_and_newlines() {
        let url = mailto_url("ann@example.com", "Re: Q3 + Q4", "Hi Ann,\nSee below");
        assert_eq!(
            url,
            "mailto:ann@example.com?subject=Re%3A%20Q3%20%2B%20Q4&body=Hi%20Ann%2C%0ASee%20below"
        );
    }

    #[test]
    fn mailto_without_fields_is_bare() {
        assert_eq!(mailto_url("a@b.c", "", ""), "mailto:a@b.c");
        assert_eq!(mailto_url("a@b.c", "", "x"), "mailto:a@b.c?body=x");
    }

    #[tokio::test]
    async fn static_context_respects_budget() {
        let ctx = StaticContext::new("abcdef");
        assert_eq!(ctx.gather(3).await, Ok("abc".to_string()));
        assert_eq!(ctx.gather(100).await, Ok("abcdef".to_string()));
    }
}
