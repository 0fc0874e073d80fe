mod app;
mod config;
mod http;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::info;
use warehouse_mirror_core::fetch::{ReplaySource, SnapshotSource};

use crate::{
    app::App,
    config::{ViewerConfig, load_config},
    http::HttpSource,
    ui::ui,
};

#[derive(Parser, Debug)]
#[command(version, about = "Terminal mirror of a warehouse simulation", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Simulation server base URL
    #[arg(short, long, value_name = "URL")]
    server: Option<String>,

    /// Replay a recorded run (JSON array of snapshots) instead of polling
    #[arg(short, long, value_name = "RUN_FILE")]
    replay: Option<PathBuf>,

    /// Poll interval in milliseconds
    #[arg(long, value_name = "MS")]
    poll_ms: Option<u64>,

    /// Log file (the terminal is taken by the UI)
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(server) = args.server {
        config.server = server;
    }
    if let Some(poll_ms) = args.poll_ms {
        config.poll_interval_ms = poll_ms;
    }
    if let Some(log_file) = args.log_file {
        config.log_file = log_file;
    }

    init_tracing(&config.log_file)?;

    let source: Box<dyn SnapshotSource> = match &args.replay {
        Some(path) => Box::new(
            ReplaySource::from_file(path)
                .with_context(|| format!("Failed to load replay {}", path.display()))?,
        ),
        None => Box::new(HttpSource::new(
            config.server.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )?),
    };

    // Initialize before taking over the terminal so errors print normally
    let mut app = App::new(source, &config).context("Failed to initialize simulation")?;
    info!(server = %config.server, "viewer started");

    let mut terminal = setup_terminal()?;
    let result = run_app(
        &mut terminal,
        &mut app,
        Duration::from_millis(config.poll_interval_ms),
    );
    restore_terminal(&mut terminal)?;

    result
}

/// Sends logs to `path`; `RUST_LOG` overrides the default filter.
fn init_tracing(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warehouse_mirror_core=info,warehouse_mirror_tui=info".into()),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop: one poll per interval, redrawing in between.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    poll_interval: Duration,
) -> Result<()> {
    let mut last_poll = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = poll_interval
            .checked_sub(last_poll.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    _ => {}
                }
            }
        }

        // The cycle runs to completion before a quit is honoured
        if last_poll.elapsed() >= poll_interval {
            app.tick(Instant::now());
            last_poll = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
