//! The viewer shell: owns the parsed report, the section model and the scroll surface, routes
//! input, gates on busy, and draws a frame.
use crate::charts;
use crate::charts::ChartImage;
use crate::charts::ChartRenderer;
use crate::charts::GraphicsTier;
use crate::charts::ImagePlacement;
use crate::charts::PreparedMarkdown;
use crate::collaborators::Clipboard;
use crate::collaborators::ContextSource;
use crate::collaborators::GenerationProvider;
use crate::collaborators::Handoff;
use crate::effects::Collaborators;
use crate::effects::DEFAULT_CONTEXT_BUDGET;
use crate::effects::Dispatch;
use crate::effects::Dispatcher;
use crate::effects::Effect;
use crate::effects::EffectOutcome;
use crate::effects::STATUS_TTL;
use crate::effects::StatusKind;
use crate::effects::StatusUpdate;
use crate::error::ViewerError;
use crate::overlay;
use crate::overlay::OpenRefusal;
use crate::overlay::OverlayCommit;
use crate::overlay::OverlayState;
use crate::sections::Section;
use crate::sections::SectionModel;
use crate::structure::ReportStructure;
use crate::structure::parse_report;
use crate::zones::ZoneState;
use crate::zones::supports_hyperlinks;
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::Line;
use ratatui::text::Span;
use report_view_core::help::HelpBar;
use report_view_core::help::HelpBarOptions;
use report_view_core::input::InputEvent;
use report_view_core::input::KeyEvent;
use report_view_core::input::MouseEvent;
use report_view_core::input::MouseEventKind;
use report_view_core::keymap::KeyContext;
use report_view_core::keymap::ViewerCommand;
use report_view_core::keymap::ViewerKeymap;
use report_view_core::scroll::ScrollAction;
use report_view_core::theme::StyleVariant;
use report_view_core::theme::Theme;
use report_view_core::viewport::ViewportOptions;
use report_view_core::viewport::ViewportState;
use report_view_core::viewport::render_lines;
use report_view_core::viewport::split_scrollbar;
use report_view_markdown::MarkdownRender;
use report_view_markdown::RenderError;
use report_view_markdown::RendererCache;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything the shell reacts to, in the order the runtime receives it.
#[derive(Debug)]
pub enum ViewerMessage {
    Input(InputEvent),
    EffectDone(EffectOutcome),
    Tick,
    Quit,
}

#[derive(Clone, Debug)]
pub struct ViewerOptions {
    pub variant: StyleVariant,
    /// Wrap URL zones in OSC 8 escapes.
    pub hyperlinks: bool,
    pub graphics: GraphicsTier,
    pub compose_mail_after_draft: bool,
    pub context_budget: usize,
    pub show_scrollbar: bool,
    pub show_help: bool,
    pub status_ttl: Duration,
    pub wheel_step: i32,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            variant: StyleVariant::Dark,
            hyperlinks: false,
            graphics: GraphicsTier::Text,
            compose_mail_after_draft: false,
            context_budget: DEFAULT_CONTEXT_BUDGET,
            show_scrollbar: true,
            show_help: true,
            status_ttl: STATUS_TTL,
            wheel_step: 3,
        }
    }
}

impl ViewerOptions {
    /// Defaults with hyperlink and image support probed from the environment.
    pub fn detect() -> Self {
        Self {
            hyperlinks: supports_hyperlinks(),
            graphics: GraphicsTier::detect(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug)]
struct Status {
    update: StatusUpdate,
    expires_at: Instant,
}

pub struct ReportViewer {
    prepared: PreparedMarkdown,
    structure: ReportStructure,
    renderer: Arc<dyn MarkdownRender>,
    chart_renderer: Option<Arc<dyn ChartRenderer>>,
    collaborators: Collaborators,
    cancel: CancellationToken,
    keymap: ViewerKeymap,
    options: ViewerOptions,
    theme: Theme,

    model: SectionModel,
    images: Vec<ChartImage>,
    render_width: u16,
    viewport: ViewportState,
    overlay: OverlayState,
    zones: ZoneState,
    placements: Vec<ImagePlacement>,
    status: Option<Status>,
    busy: bool,
    quit: bool,
}

impl ReportViewer {
    /// Parses `markdown` and sets up a viewer with no collaborators. Call [`ReportViewer::load`]
    /// before drawing.
    pub fn new(markdown: impl Into<String>, cancel: CancellationToken) -> Self {
        let markdown = markdown.into();
        let structure = parse_report(&markdown);
        log::debug!(
            "parsed report: {} headings, {} actions, {} links",
            structure.headings.len(),
            structure.actions.len(),
            structure.links.len()
        );
        let options = ViewerOptions::default();
        Self {
            prepared: charts::prepare(&markdown),
            structure,
            renderer: RendererCache::shared(),
            chart_renderer: None,
            collaborators: Collaborators::default(),
            cancel,
            keymap: ViewerKeymap::default(),
            theme: Theme::for_variant(options.variant),
            options,
            model: SectionModel::default(),
            images: Vec::new(),
            render_width: 0,
            viewport: ViewportState::default(),
            overlay: OverlayState::Closed,
            zones: ZoneState::default(),
            placements: Vec::new(),
            status: None,
            busy: false,
            quit: false,
        }
    }

    pub fn with_options(mut self, options: ViewerOptions) -> Self {
        self.theme = Theme::for_variant(options.variant);
        self.options = options;
        self
    }

    pub fn with_keymap(mut self, keymap: ViewerKeymap) -> Self {
        self.keymap = keymap;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn MarkdownRender>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_chart_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.chart_renderer = Some(renderer);
        self
    }

    pub fn with_handoff(mut self, handoff: Arc<dyn Handoff>) -> Self {
        self.collaborators.handoff = Some(handoff);
        self
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.collaborators.clipboard = Some(clipboard);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.collaborators.provider = Some(provider);
        self
    }

    pub fn with_context(mut self, context: Arc<dyn ContextSource>) -> Self {
        self.collaborators.context = Some(context);
        self
    }

    /// Renders for a terminal `width` cells wide. A render failure here is fatal to the caller.
    pub fn load(&mut self, width: u16) -> Result<(), ViewerError> {
        let content_width = self.content_width(width);
        match self.render_at(content_width) {
            Ok((lines, images)) => {
                self.install(lines, images, content_width);
                Ok(())
            }
            Err(err) => {
                log::error!("initial render at width {content_width} failed: {err}");
                Err(ViewerError::Render(err))
            }
        }
    }

    pub fn structure(&self) -> &ReportStructure {
        &self.structure
    }

    pub fn sections(&self) -> &[Section] {
        self.model.sections()
    }

    pub fn model(&self) -> &SectionModel {
        &self.model
    }

    pub fn visible_text(&self) -> String {
        self.model.visible_text()
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }

    pub fn zones(&self) -> &ZoneState {
        &self.zones
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Status text still inside its display window at `now`.
    pub fn status_text(&self, now: Instant) -> Option<&str> {
        self.status
            .as_ref()
            .filter(|s| now < s.expires_at)
            .map(|s| s.update.text.as_str())
    }

    /// Images to write after the last drawn frame. Drained by the runtime.
    pub fn take_placements(&mut self) -> Vec<ImagePlacement> {
        std::mem::take(&mut self.placements)
    }

    /// Processes one message. A returned effect must be run and its outcome sent back as
    /// [`ViewerMessage::EffectDone`]; the viewer stays busy until then.
    pub fn handle_message(&mut self, message: ViewerMessage, now: Instant) -> Option<Effect> {
        match message {
            ViewerMessage::Input(event) => self.handle_input(event, now),
            ViewerMessage::EffectDone(outcome) => {
                self.busy = false;
                self.set_status(StatusUpdate::from_outcome(&outcome), now);
                None
            }
            ViewerMessage::Tick => {
                if self.status.as_ref().is_some_and(|s| now >= s.expires_at) {
                    self.status = None;
                }
                None
            }
            ViewerMessage::Quit => {
                self.quit = true;
                None
            }
        }
    }

    pub fn handle_input(&mut self, event: InputEvent, now: Instant) -> Option<Effect> {
        match event {
            InputEvent::Key(key) => self.handle_key(key, now),
            InputEvent::Mouse(mouse) => self.handle_mouse(mouse, now),
            InputEvent::Resize(width, _) => {
                self.relayout(self.content_width(width), now);
                None
            }
        }
    }

    fn key_context(&self) -> KeyContext {
        if self.overlay.is_open() {
            KeyContext::Overlay
        } else {
            KeyContext::Document
        }
    }

    fn handle_key(&mut self, key: KeyEvent, now: Instant) -> Option<Effect> {
        let command = self.keymap.command_for(self.key_context(), &key)?;
        if command == ViewerCommand::Quit {
            self.quit = true;
            return None;
        }
        if self.busy {
            log::debug!("busy, ignoring {command:?}");
            return None;
        }
        if self.overlay.is_open() {
            return self.overlay_command(command, now);
        }
        self.document_command(command, now);
        None
    }

    fn document_command(&mut self, command: ViewerCommand, now: Instant) {
        let top = self.viewport.y as usize;
        match command {
            ViewerCommand::NextSection => {
                if let Some(line) = self.model.next_heading_after(top) {
                    self.viewport.scroll_to(line as u32);
                }
            }
            ViewerCommand::PrevSection => {
                if let Some(line) = self.model.prev_heading_before(top) {
                    self.viewport.scroll_to(line as u32);
                }
            }
            ViewerCommand::ToggleSection => {
                let Some(idx) = self.toggle_target(top) else {
                    return;
                };
                if let Some(line) = self.model.toggle(idx) {
                    self.sync_content_height();
                    self.viewport.scroll_to(line as u32);
                }
            }
            ViewerCommand::CollapseAll => self.apply_all(true),
            ViewerCommand::ExpandAll => self.apply_all(false),
            ViewerCommand::OpenActions => {
                let result = overlay::open_actions(&mut self.overlay, &self.structure.actions, false);
                self.report_refusal(result, "No actions in this report", now);
            }
            ViewerCommand::OpenLinks => {
                let result = overlay::open_links(&mut self.overlay, &self.structure.links, false);
                self.report_refusal(result, "No links in this report", now);
            }
            ViewerCommand::Scroll(action) => action.apply(&mut self.viewport, 1),
            ViewerCommand::Quit | ViewerCommand::CloseOverlay | ViewerCommand::Execute => {}
        }
    }

    /// Section owning the top row; when that one cannot fold (level 1), the first foldable
    /// heading on screen.
    fn toggle_target(&self, top: usize) -> Option<usize> {
        let idx = self.model.section_at(top)?;
        let sections = self.model.sections();
        if sections[idx].is_collapsible() {
            return Some(idx);
        }
        let bottom = top + (self.viewport.viewport_h.max(1) as usize);
        (idx + 1..sections.len()).find(|&i| {
            sections[i].is_collapsible()
                && self
                    .model
                    .visible_line_of(i)
                    .is_some_and(|v| v >= top && v < bottom)
        })
    }

    fn apply_all(&mut self, collapse: bool) {
        let anchor = self.model.section_at(self.viewport.y as usize);
        if collapse {
            self.model.collapse_all();
        } else {
            self.model.expand_all();
        }
        self.sync_content_height();
        if let Some(line) = anchor.and_then(|idx| self.model.visible_line_of(idx)) {
            self.viewport.scroll_to(line as u32);
        }
    }

    fn report_refusal(&mut self, result: Result<(), OpenRefusal>, empty: &str, now: Instant) {
        if let Err(OpenRefusal::Empty) = result {
            self.set_status(StatusUpdate::info(empty), now);
        }
    }

    fn overlay_command(&mut self, command: ViewerCommand, now: Instant) -> Option<Effect> {
        match command {
            ViewerCommand::CloseOverlay => {
                self.overlay = OverlayState::Closed;
                None
            }
            ViewerCommand::Execute => {
                let commit =
                    overlay::commit(&mut self.overlay, &self.structure.actions, &self.structure.links)?;
                let dispatcher = self.dispatcher();
                let dispatch = match commit {
                    OverlayCommit::RunAction(action) => dispatcher.dispatch(&action),
                    OverlayCommit::CopyLink(link) => dispatcher.copy_link(&link),
                };
                self.apply_dispatch(dispatch, now)
            }
            ViewerCommand::Scroll(action) => {
                let page = self.viewport.viewport_h.max(1) as isize;
                if let Some(cursor) = self.overlay.cursor_mut() {
                    let delta = match action {
                        ScrollAction::Up => -1,
                        ScrollAction::Down => 1,
                        ScrollAction::PageUp => -page,
                        ScrollAction::PageDown => page,
                        ScrollAction::Top => -(cursor.count() as isize),
                        ScrollAction::Bottom => cursor.count() as isize,
                    };
                    cursor.move_by(delta);
                }
                None
            }
            _ => None,
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent, now: Instant) -> Option<Effect> {
        if self.busy {
            return None;
        }
        let step = self.options.wheel_step;
        match mouse.kind {
            MouseEventKind::ScrollUp | MouseEventKind::ScrollDown => {
                let down = mouse.kind == MouseEventKind::ScrollDown;
                match self.overlay.cursor_mut() {
                    Some(cursor) => cursor.move_by(if down { 1 } else { -1 }),
                    None => self.viewport.scroll_y_by(if down { step } else { -step }),
                }
                None
            }
            _ if mouse.is_left_click() && !self.overlay.is_open() => {
                let url = self.zones.url_at(mouse.x, mouse.y)?.to_string();
                log::info!("click on link zone: {url}");
                let dispatch = self.dispatcher().open_link(&url);
                self.apply_dispatch(dispatch, now)
            }
            _ => None,
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.collaborators.clone(), self.cancel.clone())
            .with_compose_mail_after_draft(self.options.compose_mail_after_draft)
            .with_context_budget(self.options.context_budget)
    }

    fn apply_dispatch(&mut self, dispatch: Dispatch, now: Instant) -> Option<Effect> {
        match dispatch {
            Dispatch::Status(update) => {
                self.set_status(update, now);
                None
            }
            Dispatch::Pending(effect) => {
                self.busy = true;
                self.set_status(StatusUpdate::info(effect.pending_message()), now);
                Some(effect)
            }
        }
    }

    fn set_status(&mut self, update: StatusUpdate, now: Instant) {
        self.status = Some(Status {
            update,
            expires_at: now + self.options.status_ttl,
        });
    }

    fn content_width(&self, width: u16) -> u16 {
        if self.options.show_scrollbar && width >= 2 {
            width - 1
        } else {
            width
        }
    }

    fn render_at(&self, width: u16) -> Result<(Vec<Line<'static>>, Vec<ChartImage>), RenderError> {
        let text = self
            .renderer
            .render(&self.prepared.markdown, width, self.options.variant)?;
        let out = charts::substitute(
            text.into_lines(),
            &self.prepared.charts,
            self.chart_renderer.as_deref(),
            self.options.graphics,
            width,
            &self.theme,
        );
        Ok((out.lines, out.images))
    }

    fn install(&mut self, lines: Vec<Line<'static>>, images: Vec<ChartImage>, width: u16) {
        let collapsed = self.model.collapsed_raw_lines();
        let mut model = SectionModel::new(lines, &self.structure.headings);
        if !collapsed.is_empty() {
            model.restore_collapsed(&collapsed);
        }
        self.model = model;
        self.images = images;
        self.render_width = width;
        self.sync_content_height();
    }

    /// Re-renders at a new width. On failure the previous render stays and an error is shown.
    fn relayout(&mut self, width: u16, now: Instant) {
        if width == self.render_width || width == 0 {
            return;
        }
        let anchor = self
            .model
            .section_at(self.viewport.y as usize)
            .and_then(|idx| self.model.sections().get(idx))
            .map(|s| s.heading.raw_line);
        match self.render_at(width) {
            Ok((lines, images)) => {
                self.install(lines, images, width);
                let line = anchor.and_then(|raw| {
                    let idx = self
                        .model
                        .sections()
                        .iter()
                        .position(|s| s.heading.raw_line == raw)?;
                    self.model.visible_line_of(idx)
                });
                if let Some(line) = line {
                    self.viewport.scroll_to(line as u32);
                }
            }
            Err(err) => {
                log::error!("re-render at width {width} failed, keeping previous layout: {err}");
                self.render_width = width;
                self.set_status(StatusUpdate::error(format!("render failed: {err}")), now);
            }
        }
    }

    fn sync_content_height(&mut self) {
        self.viewport
            .set_content_height(self.model.visible_len() as u32);
    }

    pub fn draw(&mut self, frame: &mut Frame<'_>, now: Instant) {
        let area = frame.area();
        let (body, footer) = if self.options.show_help && area.height >= 2 {
            (
                Rect::new(area.x, area.y, area.width, area.height - 1),
                Some(Rect::new(area.x, area.y + area.height - 1, area.width, 1)),
            )
        } else {
            (area, None)
        };

        self.relayout(self.content_width(body.width), now);
        let (text_area, _) = split_scrollbar(body, self.options.show_scrollbar);
        self.viewport.set_viewport(text_area.width, text_area.height);
        self.sync_content_height();

        let buf = frame.buffer_mut();
        let viewport_options = ViewportOptions {
            style: self.theme.text_primary,
            show_scrollbar: self.options.show_scrollbar,
            scrollbar_style: self.theme.border,
        };
        render_lines(body, buf, self.model.visible_lines(), &self.viewport, &viewport_options);

        let range = self.viewport.visible_range();
        let top = range.start;
        let visible = self.model.visible_lines();
        let rows = range
            .clone()
            .filter_map(|i| visible.get(i).map(|l| (text_area.y + (i - top) as u16, l)));
        self.zones
            .rebuild(rows, text_area.x, text_area.width, &self.structure.links);
        if self.options.hyperlinks {
            self.zones.apply_hyperlinks(buf);
        }

        self.placements.clear();
        if !self.overlay.is_open() {
            for image in &self.images {
                let Some(v) = self.model.rendered_to_visible(image.rendered_line) else {
                    continue;
                };
                if v >= top && v + image.rows as usize <= range.end {
                    self.placements.push(ImagePlacement {
                        x: text_area.x,
                        y: text_area.y + (v - top) as u16,
                        sequence: image.sequence.clone(),
                    });
                }
            }
        }

        match self.overlay {
            OverlayState::Closed => {}
            OverlayState::Actions(cursor) => {
                let rows: Vec<String> =
                    self.structure.actions.iter().map(overlay::action_row).collect();
                overlay::render_popup(body, buf, "Actions", &rows, cursor.selected(), &self.theme);
            }
            OverlayState::Links(cursor) => {
                let rows: Vec<String> = self.structure.links.iter().map(overlay::link_row).collect();
                overlay::render_popup(body, buf, "Links", &rows, cursor.selected(), &self.theme);
            }
        }

        if let Some(footer) = footer {
            let help = HelpBar::with_options(
                self.keymap.help_bindings(self.key_context()),
                HelpBarOptions {
                    style: self.theme.text_muted,
                    key_style: self.theme.accent,
                    ..HelpBarOptions::default()
                },
            );
            help.render_ref(footer, buf, self.status_span(now));
        }
    }

    fn status_span(&self, now: Instant) -> Option<Span<'static>> {
        let status = self.status.as_ref().filter(|s| now < s.expires_at);
        match status {
            Some(s) => {
                let style = match s.update.kind {
                    StatusKind::Info => self.theme.status,
                    StatusKind::Error => self.theme.danger,
                };
                Some(Span::styled(s.update.text.clone(), style))
            }
            None if self.busy => Some(Span::styled("Working…", self.theme.status)),
            None => None,
        }
    }
}
