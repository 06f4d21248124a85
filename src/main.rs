use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing_subscriber::prelude::*;

mod actions;
mod app;
mod check;
mod config;
mod dispatcher;
mod effects;
mod registry;
mod summarizer;
mod terminal;
mod voice;

use actions::Action;
use app::App;
use config::{BackendKind, Config};
use dispatcher::Notice;
use effects::{spawn_automation_worker, EffectRunner};
use summarizer::Summarizer;
use voice::CommandRecognizer;

/// Voice-driven status board for Claude Code terminal sessions
#[derive(Parser, Debug)]
#[command(name = "voicedeck", version, about)]
struct Cli {
    /// Config file (default: ~/.voicedeck/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Terminal automation backend, overriding the config file
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Disable speech recognition
    #[arg(long)]
    no_voice: bool,

    /// Check external programs and credentials, then exit
    #[arg(long)]
    check: bool,
}

/// Log to ~/.voicedeck/logs/voicedeck.log so the TUI stays clean
fn init_logging() -> Result<PathBuf> {
    let log_dir = Config::log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let log_file = log_dir.join("voicedeck.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("Failed to open log file: {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicedeck=info".into()),
        )
        .init();

    Ok(log_file)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("Logging disabled: {:#}", e);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    let voice_enabled = !cli.no_voice && !config.voice.recognizer_command.is_empty();

    let backend = terminal::backend_for(config.backend);

    if cli.check {
        println!("voicedeck startup check");
        let items = check::run_checks(&config, backend.program(), !cli.no_voice);
        for item in &items {
            println!("{}", item);
        }
        if !check::passed(&items) {
            anyhow::bail!("{} backend is unavailable", backend.name());
        }
        println!("All required checks passed");
        return Ok(());
    }

    tracing::info!(
        "voicedeck starting (backend: {}, voice: {})",
        backend.name(),
        voice_enabled
    );

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();
    let refresh = Arc::new(Notify::new());

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == KeyEventKind::Press && input_tx.send(Action::KeyPress(key)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Quit cleanly on SIGINT delivered outside raw mode
    let quit_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = quit_tx.send(Action::Quit);
        }
    });

    // Spawn session poller
    let poll_tx = tx.clone();
    let poll_backend = backend.clone();
    let poll_wake = refresh.clone();
    let filter = config.session_filter.clone();
    let interval = config.poll_interval();
    tokio::spawn(async move {
        loop {
            match registry::capture_sessions(poll_backend.as_ref(), &filter).await {
                Ok(captures) => {
                    if poll_tx.send(Action::Polled(captures)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Session scan failed: {}", e);
                    let _ = poll_tx.send(Action::Error(format!("{}: {}", poll_backend.name(), e)));
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = poll_wake.notified() => {}
            }
        }
    });

    // Spawn voice listener
    if voice_enabled {
        let recognizer = CommandRecognizer::new(config.voice.recognizer_command.clone());
        let restart_delay = Duration::from_millis(config.voice.restart_delay_ms);
        tokio::spawn(voice::run_listener(recognizer, tx.clone(), restart_delay));
    }

    let summarizer = Arc::new(Summarizer::from_config(&config));
    let mut runner = EffectRunner::new(
        spawn_automation_worker(backend.clone(), tx.clone()),
        summarizer.clone(),
        voice::speaker_for(&config.speech),
        refresh,
        tx,
    );

    // Create app state
    let mut app = App::new(&config, backend.name());
    app.voice_enabled = voice_enabled;
    app.remote_summaries = summarizer.is_remote();

    // Main event loop
    let result = loop {
        // Render
        terminal.draw(|f| app.render(f))?;

        // Carry out effects requested by the last action
        for effect in app.take_pending_effects() {
            if let Some(msg) = runner.run(effect) {
                app.notice = Some(Notice::error(msg));
            }
        }

        // Handle events from channel
        let Some(action) = rx.recv().await else {
            break Ok(());
        };
        match app.handle_action(action) {
            Ok(true) => break Ok(()),
            Ok(false) => {}
            Err(e) => break Err(e),
        }
    };

    // Restore terminal
    ratatui::restore();
    tracing::info!("voicedeck stopped");
    result
}
