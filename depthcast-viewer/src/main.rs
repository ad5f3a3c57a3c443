//! depthcast viewer — entry point.
//!
//! ```text
//! depthcast-viewer                         Open the viewer with defaults
//! depthcast-viewer --config <path>         Use custom config TOML
//! depthcast-viewer --listen unix:/x.sock   Override the listen endpoint
//! depthcast-viewer --autostart             Start the depth server at once
//! depthcast-viewer --gen-config            Dump default config and exit
//! ```

use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{self, Event};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::info;
use tracing_subscriber::EnvFilter;

use depthcast_core::Endpoint;
use depthcast_viewer::App;
use depthcast_viewer::config::{LoggingConfig, ViewerConfig};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "depthcast-viewer", about = "Receive and render Kinect point clouds")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "depthcast-viewer.toml")]
    config: PathBuf,

    /// Listen endpoint (HOST:PORT, tcp:HOST:PORT or unix:/path).
    #[arg(short, long)]
    listen: Option<Endpoint>,

    /// Start the depth server as soon as the viewer opens.
    #[arg(long)]
    autostart: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

/// Input poll timeout, roughly one frame at 60 Hz.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, fallback) = ViewerConfig::load(&cli.config);
    if let Some(listen) = cli.listen {
        config.network.listen = listen;
    }
    if cli.autostart {
        config.display.autostart = true;
    }

    init_tracing(&config.logging)?;
    info!("depthcast-viewer v{}", env!("CARGO_PKG_VERSION"));
    if let Some(fallback) = &fallback {
        fallback.log();
    }

    // 1. Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(std::io::stdout()))?;
    terminal.clear()?;

    let mut app = App::new(&config);
    // Tracing may be discarded, so a broken config also shows in the panel.
    if let Some(fallback) = fallback.as_ref().filter(|f| f.is_invalid()) {
        app.add_log(fallback.to_string());
    }
    if config.display.autostart {
        app.start_server();
    }

    // 2. UI loop. The server runs on its own thread; nothing here blocks
    // longer than one input poll.
    let result = run(&mut terminal, &mut app);
    app.shutdown();

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;

    result?;
    Ok(())
}

fn run(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> io::Result<()> {
    while !app.exit {
        terminal.draw(|f| app.draw(f))?;

        if event::poll(FRAME_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }
        app.tick();
    }
    Ok(())
}

/// The terminal belongs to the UI, so tracing goes to the configured file
/// or nowhere.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.file.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init();
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}
