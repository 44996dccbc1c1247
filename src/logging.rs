//! Logging setup.
//!
//! Everything goes to one backend: journald on Linux when it is reachable,
//! otherwise a daily log file. A command-line run can also echo warnings and
//! errors to stderr, where the user is watching.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Environment variable holding the log filter, e.g. `ELEMSYNC_LOG=debug`.
pub const LOG_ENV: &str = "ELEMSYNC_LOG";

const SYSLOG_IDENTIFIER: &str = "elemsync";
const LOG_FILE_PREFIX: &str = "elemsync.log";

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// What, besides the backend, is shown on the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    Off,
    /// Warnings and errors on stderr.
    Warnings,
}

/// Install the global subscriber. Call once at startup.
///
/// Per-record detail (unreadable files, mismatches) is logged at `debug`;
/// progress and summaries at `info`.
pub fn init(log_dir: Option<PathBuf>, console: Console) -> Result<()> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let (backend, destination) = backend(log_dir)?;
    let mut layers = vec![backend];
    if console == Console::Warnings {
        layers.push(console_layer());
    }

    tracing_subscriber::registry().with(env_filter).with(layers).try_init()?;

    tracing::debug!("Logging to {}", destination);
    Ok(())
}

fn backend(log_dir: Option<PathBuf>) -> Result<(BoxedLayer, String)> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            let layer = journald.with_syslog_identifier(SYSLOG_IDENTIFIER.to_string());
            return Ok((layer.boxed(), "journald".to_string()));
        }
    }

    let log_dir = log_dir.unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
    Ok((layer.boxed(), log_dir.display().to_string()))
}

fn console_layer() -> BoxedLayer {
    fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_filter(LevelFilter::WARN)
        .boxed()
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("elemsync")
        .join("logs")
}
