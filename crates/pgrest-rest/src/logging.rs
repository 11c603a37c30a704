//! Logging capability injected into the query parser, plus subscriber setup

use parking_lot::Mutex;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pgrest_common::config::LoggingConfig;
use pgrest_common::error::{Error, Result};

use crate::filter::SkippedFilter;

/// Receives the diagnostics the parser emits while degrading gracefully
pub trait ParseLogger: Send + Sync {
    /// A filter was dropped because its value could not be coerced
    fn filter_skipped(&self, skipped: &SkippedFilter);
}

/// Default logger: forwards to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ParseLogger for TracingLogger {
    fn filter_skipped(&self, skipped: &SkippedFilter) {
        warn!(
            key = %skipped.key,
            value = %skipped.value,
            reason = %skipped.reason,
            "Dropping filter with invalid value"
        );
    }
}

/// Keeps every reported event in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    skipped: Mutex<Vec<SkippedFilter>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped(&self) -> Vec<SkippedFilter> {
        self.skipped.lock().clone()
    }
}

impl ParseLogger for MemoryLogger {
    fn filter_skipped(&self, skipped: &SkippedFilter) {
        self.skipped.lock().push(skipped.clone());
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.level`.
///
/// # Errors
/// Returns `Error::Config` if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init()
    };

    installed.map_err(|e| Error::Config(format!("tracing subscriber: {}", e)))
}
