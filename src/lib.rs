//! Hark - offline voice commands for the Linux desktop
//!
//! Waits for a wake word, captures one short utterance, transcribes it
//! offline against a closed vocabulary, resolves it to a command and
//! dispatches the matching desktop action. Built to idle cheaply on
//! low-spec machines and to keep listening no matter what a single
//! command cycle does.

use anyhow::Result;

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod listener;
pub mod notify;
pub mod recorder;
pub mod resolver;
pub mod transcribe;
pub mod vocabulary;
pub mod wake;

/// Set up tracing to stdout and, when possible, to ~/.hark/logs/hark.log.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    use tracing_subscriber::prelude::*;

    let log_dir = config::get_config_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("hark.log"))
        .ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false);
        let stdout_layer = tracing_subscriber::fmt::layer();
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Load configuration, build the listener and run it to completion
pub fn run() -> Result<()> {
    let config = config::get_config();

    let mut listener = listener::Listener::new(config)?;

    // The sender side is the hook for embedding hosts to request shutdown;
    // the standalone binary simply holds it open for the process lifetime
    let (_shutdown_tx, shutdown_rx) = crossbeam_channel::unbounded::<()>();

    listener.run(shutdown_rx)
}
