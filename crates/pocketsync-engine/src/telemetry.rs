//! Tracing initialization for embedding applications
//!
//! The engine itself only emits `tracing` events; installing a subscriber is
//! the embedder's call. This helper wires the configured level and log file
//! into a `fmt` subscriber so every embedding (test harness, mobile shell,
//! CLI probe) gets the same output shape.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pocketsync_core::config::LoggingConfig;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set. Returns an error if
/// the log directory cannot be created or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if let Some(parent) = config.file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)
        .with_context(|| format!("opening log file {}", config.file.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::sync::Arc::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    info!(level = %config.level, file = %config.file.display(), "Logging initialized");
    Ok(())
}

/// Installs a stderr subscriber at the given level, for tests and ad-hoc
/// embeddings without a config file. Repeated calls are no-ops.
pub fn init_for_tests(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_test_writer()
        .try_init();
}
