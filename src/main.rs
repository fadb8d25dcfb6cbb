mod app;
mod cli;
mod commands;
mod config;
mod docker;
mod input;
mod model;
mod navigation;
mod runtime;
mod stream;
mod ui;
mod viewport;
mod views;

use anyhow::{Context, Result};
use app::{App, Msg, Task};
use clap::Parser;
use cli::CliArgs;
use config::RuntimeConfigWatcher;
use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyEventKind,
    KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use docker::ContainerCli;
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use runtime::{TaskRunner, compact_error};
use std::fs::File;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const MIN_REFRESH_MS: u64 = 250;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let mut watcher = match args.config.clone() {
        Some(path) => RuntimeConfigWatcher::pinned(path),
        None => RuntimeConfigWatcher::discover(),
    };
    let mut settings = watcher.load_current()?;
    if let Some(runtime) = &args.runtime {
        settings.runtime = runtime.clone();
    }
    info!(
        runtime = %settings.runtime,
        config = ?watcher.path(),
        "starting berth"
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let mut runner = TaskRunner::new(ContainerCli::new(settings.runtime.clone()), &settings, tx);
    let mut app = App::new(settings).context("failed to build command registry")?;

    run(
        &mut app,
        &mut runner,
        rx,
        &mut watcher,
        args.refresh_ms.max(MIN_REFRESH_MS),
    )
    .await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let writer = match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::sink),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_writer(writer)
        .try_init();

    Ok(())
}

async fn run(
    app: &mut App,
    runner: &mut TaskRunner,
    rx: UnboundedReceiver<Msg>,
    watcher: &mut RuntimeConfigWatcher,
    refresh_ms: u64,
) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, runner, rx, watcher, refresh_ms).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
            .context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )
    .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    runner: &mut TaskRunner,
    mut rx: UnboundedReceiver<Msg>,
    watcher: &mut RuntimeConfigWatcher,
    refresh_ms: u64,
) -> Result<()> {
    let size = terminal.size().context("failed to read terminal size")?;
    app.update(Msg::Resize {
        cols: size.width,
        rows: size.height,
    });
    let init = app.init();
    runner.dispatch(init);

    let mut reader = EventStream::new();
    let mut ticker = interval(Duration::from_millis(refresh_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_config_error = None;

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        let task = tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        app.update(Msg::Key(key))
                    }
                    Some(Ok(Event::Mouse(mouse))) => app.update(Msg::Mouse(mouse)),
                    Some(Ok(Event::Resize(cols, rows))) => app.update(Msg::Resize { cols, rows }),
                    Some(Ok(_)) => Task::None,
                    Some(Err(error)) => {
                        app.set_error(format!("terminal event error: {error}"));
                        Task::None
                    }
                    None => {
                        warn!("terminal event stream closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                let mut tasks = vec![app.update(Msg::Tick)];
                match watcher.reload_if_changed() {
                    Ok(Some(settings)) => {
                        info!(source = ?settings.source, "config reloaded");
                        last_config_error = None;
                        runner.apply_settings(&settings);
                        tasks.push(app.update(Msg::ConfigReloaded(Ok(settings))));
                    }
                    Ok(None) => {}
                    Err(error) => {
                        let error = compact_error(&error);
                        if last_config_error.as_ref() != Some(&error) {
                            warn!(%error, "config reload failed");
                            last_config_error = Some(error.clone());
                            tasks.push(app.update(Msg::ConfigReloaded(Err(error))));
                        }
                    }
                }
                Task::batch(tasks)
            }
            Some(msg) = rx.recv() => app.update(msg),
        };

        if !runner.dispatch(task) {
            break;
        }
    }

    Ok(())
}
