//! Terminal event loop: raw mode and alternate screen, a blocking input reader, a status ticker,
//! and the effect runner, all feeding one message channel.
use crate::effects::EffectRunner;
use crate::error::ViewerError;
use crate::viewer::ReportViewer;
use crate::viewer::ViewerMessage;
use crossterm::cursor::MoveTo;
use crossterm::event::DisableMouseCapture;
use crossterm::event::EnableMouseCapture;
use crossterm::execute;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::EnterAlternateScreen;
use crossterm::terminal::LeaveAlternateScreen;
use crossterm::terminal::disable_raw_mode;
use crossterm::terminal::enable_raw_mode;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use report_view_core::crossterm_input::input_event_from_crossterm;
use std::io::Stdout;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const INPUT_POLL: Duration = Duration::from_millis(50);
const TICK: Duration = Duration::from_millis(250);

/// Restores the terminal when dropped, including on early return.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self, ViewerError> {
        enable_raw_mode()?;
        let guard = TerminalGuard;
        execute!(std::io::stdout(), EnterAlternateScreen, EnableMouseCapture)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(
            std::io::stdout(),
            DisableMouseCapture,
            LeaveAlternateScreen,
            crossterm::cursor::Show
        );
        let _ = disable_raw_mode();
    }
}

/// Runs `viewer` full screen until the user quits or `cancel` fires.
///
/// The report is rendered before the terminal is touched, so a render failure is returned
/// with the screen intact. Effects still running at quit are abandoned.
pub async fn run(mut viewer: ReportViewer, cancel: CancellationToken) -> Result<(), ViewerError> {
    let (width, _) = crossterm::terminal::size()?;
    viewer.load(width)?;

    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(std::io::stdout()))?;
    terminal.hide_cursor()?;
    terminal.clear()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<ViewerMessage>();
    let stop = Arc::new(AtomicBool::new(false));

    let input_tx = tx.clone();
    let stop_reader = Arc::clone(&stop);
    tokio::task::spawn_blocking(move || {
        while !stop_reader.load(Ordering::Relaxed) {
            match crossterm::event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(err) => {
                    log::error!("terminal poll failed: {err}");
                    break;
                }
            }
            match crossterm::event::read() {
                Ok(ev) => {
                    let Some(input) = input_event_from_crossterm(ev) else {
                        continue;
                    };
                    if input_tx.send(ViewerMessage::Input(input)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log::error!("terminal read failed: {err}");
                    break;
                }
            }
        }
    });

    let tick_tx = tx.clone();
    let stop_tick = Arc::clone(&stop);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        loop {
            interval.tick().await;
            if stop_tick.load(Ordering::Relaxed) || tick_tx.send(ViewerMessage::Tick).is_err() {
                break;
            }
        }
    });

    let runner = EffectRunner::new(tokio::runtime::Handle::current(), tx);
    let result = event_loop(&mut terminal, &mut viewer, &mut rx, &runner, &cancel).await;
    stop.store(true, Ordering::Relaxed);
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    viewer: &mut ReportViewer,
    rx: &mut mpsc::UnboundedReceiver<ViewerMessage>,
    runner: &EffectRunner,
    cancel: &CancellationToken,
) -> Result<(), ViewerError> {
    loop {
        terminal.draw(|frame| viewer.draw(frame, Instant::now()))?;
        write_images(terminal, viewer)?;

        let message = tokio::select! {
            message = rx.recv() => message,
            _ = cancel.cancelled() => Some(ViewerMessage::Quit),
        };
        let Some(message) = message else {
            return Ok(());
        };
        if let Some(effect) = viewer.handle_message(message, Instant::now()) {
            runner.spawn(effect);
        }
        if viewer.should_quit() {
            log::info!("viewer quit");
            return Ok(());
        }
    }
}

fn write_images(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    viewer: &mut ReportViewer,
) -> Result<(), ViewerError> {
    let placements = viewer.take_placements();
    if placements.is_empty() {
        return Ok(());
    }
    let out = terminal.backend_mut();
    for p in placements {
        queue!(out, MoveTo(p.x, p.y), Print(p.sequence))?;
    }
    out.flush()?;
    Ok(())
}
