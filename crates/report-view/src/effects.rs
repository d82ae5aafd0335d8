//! Action dispatch: turning a selected action or link into either an immediate status line or a
//! deferred [`Effect`], and running effects off the UI loop.
use crate::collaborators::Clipboard;
use crate::collaborators::ContextSource;
use crate::collaborators::GenerationProvider;
use crate::collaborators::Handoff;
use crate::draft::Draft;
use crate::error::EffectError;
use crate::structure::Action;
use crate::structure::ActionKind;
use crate::structure::LinkEntry;
use crate::viewer::ViewerMessage;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Upper bound, in characters, of context gathered for a draft.
pub const DEFAULT_CONTEXT_BUDGET: usize = 50_000;

/// How long a status line stays visible.
pub const STATUS_TTL: Duration = Duration::from_secs(5);

const DRAFT_SYSTEM_PROMPT: &str = "You write short, ready-to-send replies. When the reply is an \
email, start with a `To:` line and a `Subject:` line, then a blank line, then the body. Output \
only the reply.";

/// Result of a finished effect: a success message or the reason it failed.
pub type EffectOutcome = Result<String, EffectError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub text: String,
    pub kind: StatusKind,
}

impl StatusUpdate {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Info,
        }
    }

    /// Error status; the text is prefixed with `Error: `.
    pub fn error(text: impl fmt::Display) -> Self {
        Self {
            text: format!("Error: {text}"),
            kind: StatusKind::Error,
        }
    }

    pub fn from_outcome(outcome: &EffectOutcome) -> Self {
        match outcome {
            Ok(message) => Self::info(message.clone()),
            Err(err) => Self::error(err),
        }
    }
}

/// Every collaborator the dispatcher may hand work to. Missing ones degrade to status messages.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub handoff: Option<Arc<dyn Handoff>>,
    pub clipboard: Option<Arc<dyn Clipboard>>,
    pub provider: Option<Arc<dyn GenerationProvider>>,
    pub context: Option<Arc<dyn ContextSource>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("handoff", &self.handoff.is_some())
            .field("clipboard", &self.clipboard.is_some())
            .field("provider", &self.provider.is_some())
            .field("context", &self.context.is_some())
            .finish()
    }
}

/// Everything a draft needs, owned so it can move onto the runtime.
pub struct DraftRequest {
    pub instruction: String,
    pub description: String,
    pub provider: Arc<dyn GenerationProvider>,
    pub context: Option<Arc<dyn ContextSource>>,
    pub context_budget: usize,
    pub clipboard: Option<Arc<dyn Clipboard>>,
    pub handoff: Option<Arc<dyn Handoff>>,
    pub compose_mail: bool,
    pub cancel: CancellationToken,
}

/// A deferred unit of work. Running it yields exactly one [`EffectOutcome`].
pub enum Effect {
    OpenUrl {
        handoff: Arc<dyn Handoff>,
        url: String,
    },
    OpenFile {
        handoff: Arc<dyn Handoff>,
        path: String,
    },
    PlayMedia {
        handoff: Arc<dyn Handoff>,
        path: String,
    },
    Copy {
        clipboard: Arc<dyn Clipboard>,
        text: String,
        done: String,
    },
    Draft(Box<DraftRequest>),
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::OpenUrl { url, .. } => f.debug_struct("OpenUrl").field("url", url).finish(),
            Effect::OpenFile { path, .. } => f.debug_struct("OpenFile").field("path", path).finish(),
            Effect::PlayMedia { path, .. } => {
                f.debug_struct("PlayMedia").field("path", path).finish()
            }
            Effect::Copy { text, .. } => f.debug_struct("Copy").field("text", text).finish(),
            Effect::Draft(req) => f
                .debug_struct("Draft")
                .field("instruction", &req.instruction)
                .finish(),
        }
    }
}

impl Effect {
    /// Status shown while the effect runs.
    pub fn pending_message(&self) -> String {
        match self {
            Effect::OpenUrl { url, .. } => format!("Opening {url}…"),
            Effect::OpenFile { path, .. } => format!("Opening {path}…"),
            Effect::PlayMedia { path, .. } => format!("Playing {path}…"),
            Effect::Copy { .. } => "Copying…".to_string(),
            Effect::Draft(req) => format!("Drafting: {}…", req.description),
        }
    }

    pub async fn run(self) -> EffectOutcome {
        match self {
            Effect::OpenUrl { handoff, url } => {
                let shown = url.clone();
                blocking(move || handoff.open_url(&url)).await?;
                Ok(format!("Opened {shown}"))
            }
            Effect::OpenFile { handoff, path } => {
                let shown = path.clone();
                blocking(move || handoff.open_file(&path)).await?;
                Ok(format!("Opened {shown}"))
            }
            Effect::PlayMedia { handoff, path } => {
                let shown = path.clone();
                blocking(move || handoff.play_media(&path)).await?;
                Ok(format!("Playing {shown}"))
            }
            Effect::Copy {
                clipboard,
                text,
                done,
            } => {
                blocking(move || clipboard.copy(&text)).await?;
                Ok(done)
            }
            Effect::Draft(req) => run_draft(*req).await,
        }
    }
}

async fn blocking<F>(f: F) -> Result<(), EffectError>
where
    F: FnOnce() -> Result<(), crate::error::CollaboratorError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(EffectError::from),
        Err(err) => Err(EffectError::Join(err.to_string())),
    }
}

async fn run_draft(req: DraftRequest) -> EffectOutcome {
    let cancel = req.cancel.clone();
    tokio::select! {
        _ = cancel.cancelled() => Err(EffectError::Cancelled),
        outcome = draft_steps(&req) => outcome,
    }
}

async fn draft_steps(req: &DraftRequest) -> EffectOutcome {
    let context = match &req.context {
        Some(source) => match source.gather(req.context_budget).await {
            Ok(text) => text,
            Err(err) => {
                log::warn!("context gathering failed, drafting without it: {err}");
                String::new()
            }
        },
        None => String::new(),
    };

    let mut user_prompt = format!("Task: {}\nInstruction: {}", req.description, req.instruction);
    if !context.is_empty() {
        user_prompt.push_str("\n\nContext:\n");
        user_prompt.push_str(&context);
    }

    let raw = req
        .provider
        .complete(req.cancel.clone(), DRAFT_SYSTEM_PROMPT, &user_prompt)
        .await?;
    if raw.trim().is_empty() {
        return Err(EffectError::EmptyDraft);
    }
    let draft = Draft::parse(&raw);
    log::info!(
        "draft ready: {} chars, to={:?} subject={:?}",
        raw.len(),
        draft.to,
        draft.subject
    );

    let mut message = match &req.clipboard {
        Some(clipboard) => {
            let clipboard = Arc::clone(clipboard);
            let text = draft.raw.clone();
            blocking(move || clipboard.copy(&text)).await?;
            "Draft copied to clipboard".to_string()
        }
        None => "Draft ready (no clipboard available)".to_string(),
    };

    if req.compose_mail
        && draft.has_recipient()
        && let Some(handoff) = &req.handoff
    {
        let handoff = Arc::clone(handoff);
        let Draft {
            to, subject, body, ..
        } = draft;
        blocking(move || handoff.open_mailto(&to, &subject, &body)).await?;
        message.push_str("; mail composer opened");
    }
    Ok(message)
}

/// What dispatching an action produced.
#[derive(Debug)]
pub enum Dispatch {
    /// Nothing to run; show this status.
    Status(StatusUpdate),
    /// Mark the viewer busy and run this.
    Pending(Effect),
}

#[derive(Clone, Debug)]
pub struct Dispatcher {
    collaborators: Collaborators,
    compose_mail_after_draft: bool,
    context_budget: usize,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(collaborators: Collaborators, cancel: CancellationToken) -> Self {
        Self {
            collaborators,
            compose_mail_after_draft: false,
            context_budget: DEFAULT_CONTEXT_BUDGET,
            cancel,
        }
    }

    pub fn with_compose_mail_after_draft(mut self, enabled: bool) -> Self {
        self.compose_mail_after_draft = enabled;
        self
    }

    pub fn with_context_budget(mut self, budget: usize) -> Self {
        self.context_budget = budget;
        self
    }

    pub fn dispatch(&self, action: &Action) -> Dispatch {
        log::info!("dispatching {} action: {}", action.kind, action.description);
        match action.kind {
            ActionKind::Open => self.open_target(action.target.trim()),
            ActionKind::Draft => self.draft(action),
            ActionKind::Configure => {
                Dispatch::Status(StatusUpdate::info(format!("Configure: {}", action.description)))
            }
            ActionKind::Play => {
                let path = action.target.trim();
                match (&self.collaborators.handoff, path.is_empty()) {
                    (_, true) => Dispatch::Status(StatusUpdate::info("Nothing to play")),
                    (None, false) => {
                        Dispatch::Status(StatusUpdate::info(format!("No media handler for {path}")))
                    }
                    (Some(handoff), false) => Dispatch::Pending(Effect::PlayMedia {
                        handoff: Arc::clone(handoff),
                        path: path.to_string(),
                    }),
                }
            }
        }
    }

    /// Links overlay commit: copy the URL.
    pub fn copy_link(&self, link: &LinkEntry) -> Dispatch {
        self.copy(link.url.clone(), format!("Copied {}", link.url))
    }

    /// Mouse click on a link zone: open the URL.
    pub fn open_link(&self, url: &str) -> Dispatch {
        match &self.collaborators.handoff {
            Some(handoff) => Dispatch::Pending(Effect::OpenUrl {
                handoff: Arc::clone(handoff),
                url: url.to_string(),
            }),
            None => Dispatch::Status(StatusUpdate::info(format!("No handler to open {url}"))),
        }
    }

    fn open_target(&self, target: &str) -> Dispatch {
        if target.is_empty() {
            return Dispatch::Status(StatusUpdate::info("Nothing to open"));
        }
        let Some(handoff) = &self.collaborators.handoff else {
            return Dispatch::Status(StatusUpdate::info(format!("No handler to open {target}")));
        };
        let handoff = Arc::clone(handoff);
        if is_url_target(target) {
            Dispatch::Pending(Effect::OpenUrl {
                handoff,
                url: target.to_string(),
            })
        } else {
            Dispatch::Pending(Effect::OpenFile {
                handoff,
                path: target.to_string(),
            })
        }
    }

    fn draft(&self, action: &Action) -> Dispatch {
        let instruction = action.instruction().to_string();
        let Some(provider) = &self.collaborators.provider else {
            return self.copy(instruction, "Copied draft instruction to clipboard".to_string());
        };
        Dispatch::Pending(Effect::Draft(Box::new(DraftRequest {
            instruction,
            description: action.description.clone(),
            provider: Arc::clone(provider),
            context: self.collaborators.context.clone(),
            context_budget: self.context_budget,
            clipboard: self.collaborators.clipboard.clone(),
            handoff: self.collaborators.handoff.clone(),
            compose_mail: self.compose_mail_after_draft,
            cancel: self.cancel.child_token(),
        })))
    }

    fn copy(&self, text: String, done: String) -> Dispatch {
        match &self.collaborators.clipboard {
            Some(clipboard) => Dispatch::Pending(Effect::Copy {
                clipboard: Arc::clone(clipboard),
                text,
                done,
            }),
            None => Dispatch::Status(StatusUpdate::error("no clipboard available")),
        }
    }
}

fn is_url_target(target: &str) -> bool {
    target.contains("://") || target.starts_with("mailto:") || target.starts_with("www.")
}

/// Runs effects on a tokio runtime and reports each outcome as a [`ViewerMessage`].
#[derive(Clone, Debug)]
pub struct EffectRunner {
    handle: tokio::runtime::Handle,
    tx: UnboundedSender<ViewerMessage>,
}

impl EffectRunner {
    pub fn new(handle: tokio::runtime::Handle, tx: UnboundedSender<ViewerMessage>) -> Self {
        Self { handle, tx }
    }

    /// Spawns `effect`. Exactly one `EffectDone` is sent, even if the effect panics.
    pub fn spawn(&self, effect: Effect) -> tokio::task::JoinHandle<()> {
        let tx = self.tx.clone();
        log::debug!("spawning effect {effect:?}");
        self.handle.spawn(async move {
            let outcome = match tokio::spawn(effect.run()).await {
                Ok(outcome) => outcome,
                Err(err) => Err(EffectError::Join(err.to_string())),
            };
            if let Err(err) = &outcome {
                log::warn!("effect failed: {err}");
            }
            let _ = tx.send(ViewerMessage::EffectDone(outcome));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Recorder {
        fn record(&self, call: String) -> Result<(), CollaboratorError> {
            self.calls.lock().push(call);
            if self.fail {
                return Err(CollaboratorError::Launch {
                    what: "test".into(),
                    reason: "refused".into(),
                });
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl Handoff for Recorder {
        fn open_url(&self, url: &str) -> Result<(), CollaboratorError> {
            self.record(format!("url {url}"))
        }
        fn open_file(&self, path: &str) -> Result<(), CollaboratorError> {
            self.record(format!("file {path}"))
        }
        fn open_mailto(&self, to: &str, subject: &str, _body: &str) -> Result<(), CollaboratorError> {
            self.record(format!("mail {to} {subject}"))
        }
        fn play_media(&self, path: &str) -> Result<(), CollaboratorError> {
            self.record(format!("play {path}"))
        }
    }

    impl Clipboard for Recorder {
        fn copy(&self, text: &str) -> Result<(), CollaboratorError> {
            self.record(text.to_string())
        }
    }

    struct FixedProvider(String);

    impl GenerationProvider for FixedProvider {
        fn complete<'a>(
            &'a self,
            _cancel: CancellationToken,
            _system_prompt: &'a str,
            user_prompt: &'a str,
        ) -> BoxFuture<'a, Result<String, CollaboratorError>> {
            let out = self.0.replace("{prompt}", user_prompt);
            async move { Ok(out) }.boxed()
        }
    }

    struct PendingProvider;

    impl GenerationProvider for PendingProvider {
        fn complete<'a>(
            &'a self,
            _cancel: CancellationToken,
            _system_prompt: &'a str,
            _user_prompt: &'a str,
        ) -> BoxFuture<'a, Result<String, CollaboratorError>> {
            futures::future::pending().boxed()
        }
    }

    struct BrokenContext;

    impl ContextSource for BrokenContext {
        fn gather(&self, _max_units: usize) -> BoxFuture<'_, Result<String, CollaboratorError>> {
            async { Err(CollaboratorError::Context("offline".into())) }.boxed()
        }
    }

    fn action(kind: ActionKind, description: &str, target: &str) -> Action {
        Action {
            kind,
            description: description.into(),
            target: target.into(),
        }
    }

    fn pending(dispatch: Dispatch) -> Effect {
        match dispatch {
            Dispatch::Pending(effect) => effect,
            Dispatch::Status(status) => panic!("expected effect, got status {status:?}"),
        }
    }

    #[test]
    fn configure_only_sets_status() {
        let d = Dispatcher::new(Collaborators::default(), CancellationToken::new());
        let out = d.dispatch(&action(ActionKind::Configure, "Enable digest", ""));
        assert!(matches!(
            out,
            Dispatch::Status(StatusUpdate { ref text, kind: StatusKind::Info }) if text == "Configure: Enable digest"
        ));
    }

    #[test]
    fn open_without_handoff_or_target_is_status_only() {
        let d = Dispatcher::new(Collaborators::default(), CancellationToken::new());
        assert!(matches!(
            d.dispatch(&action(ActionKind::Open, "x", "https://x.io")),
            Dispatch::Status(_)
        ));
        let handoff: Arc<dyn Handoff> = Arc::new(Recorder::default());
        let d = Dispatcher::new(
            Collaborators {
                handoff: Some(handoff),
                ..Collaborators::default()
            },
            CancellationToken::new(),
        );
        assert!(matches!(d.dispatch(&action(ActionKind::Open, "x", "")), Dispatch::Status(_)));
    }

    #[test]
    fn open_picks_url_or_file() {
        let handoff: Arc<dyn Handoff> = Arc::new(Recorder::default());
        let d = Dispatcher::new(
            Collaborators {
                handoff: Some(handoff),
                ..Collaborators::default()
            },
            CancellationToken::new(),
        );
        for target in ["https://x.io", "mailto:a@b.c", "www.x.io"] {
            assert!(matches!(
                pending(d.dispatch(&action(ActionKind::Open, "x", target))),
                Effect::OpenUrl { .. }
            ));
        }
        assert!(matches!(
            pending(d.dispatch(&action(ActionKind::Open, "x", "~/reports/q3.pdf"))),
            Effect::OpenFile { .. }
        ));
    }

    #[tokio::test]
    async fn draft_without_provider_copies_instruction() {
        let clipboard = Arc::new(Recorder::default());
        let d = Dispatcher::new(
            Collaborators {
                clipboard: Some(clipboard.clone()),
                ..Collaborators::default()
            },
            CancellationToken::new(),
        );
        let effect = pending(d.dispatch(&action(ActionKind::Draft, "Reply to Ann", "thank her")));
        assert!(effect.run().await.is_ok());
        assert_eq!(clipboard.calls(), vec!["thank her".to_string()]);
    }

    #[tokio::test]
    async fn draft_with_provider_copies_raw_and_composes_mail() {
        let recorder = Arc::new(Recorder::default());
        let raw = "To: ann@example.com\nSubject: Thanks\n\nHi Ann: thanks.";
        let d = Dispatcher::new(
            Collaborators {
                handoff: Some(recorder.clone()),
                clipboard: Some(recorder.clone()),
                provider: Some(Arc::new(FixedProvider(raw.to_string()))),
                context: Some(Arc::new(BrokenContext)),
            },
            CancellationToken::new(),
        )
        .with_compose_mail_after_draft(true);
        let effect = pending(d.dispatch(&action(ActionKind::Draft, "Reply", "thank Ann")));
        let outcome = effect.run().await;
        assert_eq!(
            outcome,
            Ok("Draft copied to clipboard; mail composer opened".to_string())
        );
        assert_eq!(
            recorder.calls(),
            vec![raw.to_string(), "mail ann@example.com Thanks".to_string()]
        );
    }

    #[tokio::test]
    async fn draft_prompt_carries_instruction() {
        let clipboard = Arc::new(Recorder::default());
        let d = Dispatcher::new(
            Collaborators {
                clipboard: Some(clipboard.clone()),
                provider: Some(Arc::new(FixedProvider("{prompt}".to_string()))),
                context: Some(Arc::new(crate::collaborators::StaticContext::new("ctx"))),
                ..Collaborators::default()
            },
            CancellationToken::new(),
        );
        pending(d.dispatch(&action(ActionKind::Draft, "Reply", "say yes")))
            .run()
            .await
            .expect("draft");
        let copied = clipboard.calls().remove(0);
        assert!(copied.contains("Instruction: say yes"));
        assert!(copied.ends_with("Context:\nctx"));
    }

    #[tokio::test]
    async fn cancelling_the_parent_aborts_a_draft() {
        let cancel = CancellationToken::new();
        let d = Dispatcher::new(
            Collaborators {
                provider: Some(Arc::new(PendingProvider)),
                ..Collaborators::default()
            },
            cancel.clone(),
        );
        let effect = pending(d.dispatch(&action(ActionKind::Draft, "Reply", "")));
        let task = tokio::spawn(effect.run());
        cancel.cancel();
        assert_eq!(task.await.expect("join"), Err(EffectError::Cancelled));
    }

    #[tokio::test]
    async fn handoff_failure_becomes_error_outcome() {
        let handoff = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let d = Dispatcher::new(
            Collaborators {
                handoff: Some(handoff),
                ..Collaborators::default()
            },
            CancellationToken::new(),
        );
        let outcome = pending(d.dispatch(&action(ActionKind::Play, "Intro", "clip.mp3")))
            .run()
            .await;
        let status = StatusUpdate::from_outcome(&outcome);
        assert_eq!(status.kind, StatusKind::Error);
        assert!(status.text.starts_with("Error: "));
    }

    #[tokio::test]
    async fn runner_reports_exactly_one_message() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let runner = EffectRunner::new(tokio::runtime::Handle::current(), tx);
        let clipboard: Arc<dyn Clipboard> = Arc::new(Recorder::default());
        runner
            .spawn(Effect::Copy {
                clipboard,
                text: "x".into(),
                done: "copied".into(),
            })
            .await
            .expect("join");
        assert!(matches!(
            rx.recv().await,
            Some(ViewerMessage::EffectDone(Ok(ref m))) if m == "copied"
        ));
        assert!(rx.try_recv().is_err());
    }
}
