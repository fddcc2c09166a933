//! Tracing initialization.
//!
//! Stderr gets `warn` and above unless `SESH_LOG` (an `EnvFilter` directive)
//! or `-v` says otherwise. When a log directory is available every run also
//! appends debug-level records, one JSON object per line, to a daily file in
//! `<config-dir>/logs/`.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the stderr filter directive.
pub const LOG_ENV: &str = "SESH_LOG";

const LOG_FILE_PREFIX: &str = "sesh.log";

pub fn log_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("logs")
}

fn stderr_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "sesh=debug" } else { "warn" };
    match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => {
            EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default))
        }
        _ => EnvFilter::new(default),
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the whole run. Calling this twice is harmless.
pub fn init(config_dir: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
    let mut guard = None;
    let file_layer = config_dir.and_then(|dir| {
        let dir = log_dir(dir);
        std::fs::create_dir_all(&dir).ok()?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG),
        )
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_filter(verbose));

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_dir() {
        assert_eq!(log_dir(Path::new("/cfg/sesh")), PathBuf::from("/cfg/sesh/logs"));
    }

    #[test]
    #[serial]
    fn test_init_creates_log_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let guard = init(Some(dir.path()), false);
        assert!(guard.is_some());
        assert!(log_dir(dir.path()).is_dir());
    }
}
