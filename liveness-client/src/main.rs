//! Liveness client: entry point.
//!
//! ```text
//! liveness-client                        Verify with the test pattern
//! liveness-client --frames <dir>         Replay stills from a directory
//! liveness-client --device /dev/video0   Use a camera (feature `v4l`)
//! liveness-client --config <path>        Use custom config TOML
//! liveness-client --gen-config           Dump default config and exit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use liveness_core::{SessionController, SessionHooks, SessionOutcome};

use liveness_client::config::ClientConfig;
use liveness_client::exit_code;
use liveness_client::sink::ConsoleSink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "liveness-client", about = "Run one face-liveness verification session")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "liveness-client.toml")]
    config: PathBuf,

    /// Service address (overrides config). Example: ws://127.0.0.1:8000/ws
    #[arg(short, long)]
    address: Option<String>,

    /// Image file or directory of stills to stream (overrides config).
    #[arg(short, long, conflicts_with = "test_pattern")]
    frames: Option<PathBuf>,

    /// V4L2 camera node to capture from (overrides config).
    #[arg(short, long, conflicts_with_all = ["test_pattern", "frames"])]
    device: Option<PathBuf>,

    /// Stream the synthetic test pattern instead of stills.
    #[arg(long)]
    test_pattern: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(addr) = cli.address {
        config.session.address = addr;
    }
    if let Some(frames) = cli.frames {
        config.capture.device.clear();
        config.capture.frames = frames.display().to_string();
    }
    if let Some(device) = cli.device {
        config.capture.device = device.display().to_string();
    }
    if cli.test_pattern {
        config.capture.device.clear();
        config.capture.frames.clear();
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("liveness-client v{}", env!("CARGO_PKG_VERSION"));

    let session = config.into_session_config()?;
    let hooks = SessionHooks::new()
        .on_success(|| info!("service verified the session"))
        .on_fail(|reason, message| {
            warn!(
                reason = reason.unwrap_or("-"),
                message = message.unwrap_or("-"),
                "service rejected the session"
            )
        });

    let mut controller = SessionController::new(
        session,
        config.capture.build_source()?,
        Arc::new(config.connector()),
        Arc::new(ConsoleSink::stdout()),
    )?
    .with_hooks(hooks);

    let handle = controller.start()?;
    let outcome = tokio::select! {
        outcome = handle.outcome() => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping session");
            controller.stop().await;
            SessionOutcome::Cancelled
        }
    };

    match &outcome {
        SessionOutcome::Verified | SessionOutcome::Failed { .. } => {}
        SessionOutcome::ConnectionLost { detail } => warn!("connection lost: {detail}"),
        SessionOutcome::CameraUnavailable { detail } => warn!("camera unavailable: {detail}"),
        SessionOutcome::Cancelled => info!("session cancelled"),
    }

    controller.dispose().await;
    Ok(exit_code(&outcome))
}
