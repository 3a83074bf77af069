use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::EventStream,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::time::MissedTickBehavior;

use karaoke_rs::audio::AudioBackend;
use karaoke_rs::capture::terminal::{ScreenFeed, TerminalCapture};
use karaoke_rs::config::KaraokeConfig;
use karaoke_rs::controller::AppController;
use karaoke_rs::logging;
use karaoke_rs::model::{MediaEvent, Timeline};
use karaoke_rs::view::{snapshot_frame, AppView, ViewState};

/// Redraw rate while nothing else wakes the loop (paused, help open).
const IDLE_REDRAW: Duration = Duration::from_millis(100);

type App = AppController<AudioBackend, TerminalCapture>;

/// Sing along to a lyric timeline and record the performance.
#[derive(Debug, Parser)]
#[command(name = "karaoke-rs", version, about)]
struct Cli {
    /// Audio file to play
    audio: PathBuf,

    /// Cue timeline (JSON array of cues)
    #[arg(short, long)]
    timeline: PathBuf,

    /// Config file (defaults to ./karaoke.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start recording automatically when playback starts
    #[arg(long)]
    record: bool,

    /// Disable recording entirely
    #[arg(long, conflicts_with = "record")]
    no_capture: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    tracing::info!("=== karaoke-rs starting ===");

    let mut config = KaraokeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.record {
        config.policy.auto_record = true;
    }
    if cli.no_capture {
        config.capture.enabled = false;
    }

    let timeline = Timeline::load(&cli.timeline)
        .with_context(|| format!("Failed to load timeline {}", cli.timeline.display()))?;
    let audio = AudioBackend::open(&cli.audio)
        .with_context(|| format!("Failed to open audio {}", cli.audio.display()))?;

    let title = cli
        .audio
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "karaoke".to_string());

    let feed = ScreenFeed::new();
    let capture = config.capture.enabled.then(|| {
        Arc::new(TerminalCapture::new(&feed, config.capture.output_dir.clone(), &title))
    });

    let mut app: App = AppController::new(&config, timeline, audio, capture);
    app.handle_media_event(MediaEvent::MetadataLoaded).await;

    tracing::info!(
        cues = app.timeline().len(),
        capture = config.capture.enabled,
        auto_record = config.policy.auto_record,
        "Starting TUI..."
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, &feed).await;

    // Finalize any recording while the feed is still alive
    app.shutdown().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "Application error");
    }

    if let Some(path) = app.last_saved() {
        println!("Recording saved to {}", path.display());
    }

    tracing::info!("karaoke-rs shutting down");
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    feed: &ScreenFeed,
) -> io::Result<()> {
    let mut events = EventStream::new();
    let mut redraw = tokio::time::interval(IDLE_REDRAW);
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        app.on_frame();

        {
            let state = ViewState::from_app(app, Instant::now());
            let completed = terminal.draw(|f| AppView::render(f, &state))?;
            if feed.is_subscribed() {
                feed.publish(snapshot_frame(completed.buffer, state.caption()));
            }
        }

        if app.should_quit() {
            break;
        }

        tokio::select! {
            wakeup = app.next_wakeup() => app.handle_wakeup(wakeup).await,
            event = events.next() => match event {
                Some(Ok(event)) => app.handle_terminal_event(event).await,
                Some(Err(e)) => return Err(e),
                None => break,
            },
            _ = redraw.tick() => {}
        }
    }

    Ok(())
}
