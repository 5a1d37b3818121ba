//! Log bootstrap
//!
//! Logs go to the systemd journal when its socket exists, otherwise to stdout.
//! The filter comes from `FANCTL_LOG` (default `info`).

use std::path::Path;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "FANCTL_LOG";

const JOURNAL_SOCKET: &str = "/run/systemd/journal/socket";

/// Where log records end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Journald,
    Stdout,
}

impl LogTarget {
    pub fn describe(&self) -> &'static str {
        match self {
            LogTarget::Journald => "systemd journal",
            LogTarget::Stdout => "stdout",
        }
    }
}

fn log_filter() -> String {
    std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string())
}

/// Install the global subscriber
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging() -> LogTarget {
    let filter = log_filter();

    if Path::new(JOURNAL_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                let _ = tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(EnvFilter::new(&filter))
                    .try_init();
                return LogTarget::Journald;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::new(&filter))
        .try_init();
    LogTarget::Stdout
}
