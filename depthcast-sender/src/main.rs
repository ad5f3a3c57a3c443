//! depthcast sender — entry point.
//!
//! ```text
//! depthcast-sender                          Stream using depthcast-sender.toml
//! depthcast-sender --config <path>          Load a custom config TOML
//! depthcast-sender --endpoint unix:/x.sock  Override the receiver endpoint
//! depthcast-sender --source v4l2 --device /dev/video1
//! depthcast-sender --gen-config             Write default config to stdout
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use depthcast_core::{CaptureService, Endpoint};
use depthcast_sender::config::{LoggingConfig, SenderConfig, SourceKind};
use depthcast_sender::source::open_source;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "depthcast-sender", about = "Stream Kinect depth as point clouds")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "depthcast-sender.toml")]
    config: PathBuf,

    /// Receiver endpoint (HOST:PORT, tcp:HOST:PORT or unix:/path).
    #[arg(short, long)]
    endpoint: Option<Endpoint>,

    /// Depth source to capture from.
    #[arg(short, long, value_enum)]
    source: Option<SourceKind>,

    /// V4L2 device node for the depth stream.
    #[arg(short, long)]
    device: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply command-line overrides.
    let (mut config, fallback) = SenderConfig::load(&cli.config);
    if let Some(endpoint) = cli.endpoint {
        config.network.endpoint = endpoint;
    }
    if let Some(source) = cli.source {
        config.capture.source = source;
    }
    if let Some(device) = cli.device {
        config.capture.device = device;
    }

    init_tracing(&config.logging)?;
    if let Some(fallback) = &fallback {
        fallback.log();
    }

    info!("depthcast-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("endpoint: {}", config.network.endpoint);
    info!(
        "capture: {:?} {}x{} @ {} fps",
        config.capture.source, config.capture.width, config.capture.height, config.capture.fps
    );
    info!("payload: {:?}", config.encoding.payload);

    let source = match open_source(&config.capture) {
        Ok(source) => source,
        Err(e) => {
            error!("{e}");
            eprintln!("depthcast-sender: {e}");
            std::process::exit(1);
        }
    };

    let service = CaptureService::new(config.to_service_config());
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    if let Err(e) = service.run(source).await {
        error!("fatal: {e}");
        eprintln!("depthcast-sender: {e}");
        std::process::exit(1);
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level; a configured file replaces
/// stderr.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
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
