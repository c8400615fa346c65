//! Logging setup for binaries and tests embedding the engine.
//!
//! The library itself only emits `tracing` events; nothing is printed until
//! the host installs a subscriber, for example with [`init_logging`].

use chrono::Local;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "ydls=info";

/// Timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Handle for changing the filter after initialization.
pub struct LogFilterHandle {
    handle: Handle<EnvFilter, Registry>,
}

impl LogFilterHandle {
    pub fn current(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let filter = parse_filter(directive)?;
        self.handle
            .reload(filter)
            .map_err(|e| Error::config(format!("failed to reload log filter: {}", e)))?;
        info!(directive = %directive, "Log filter updated");
        Ok(())
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("invalid log filter {:?}: {}", directive, e)))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `directive`, which falls back to
/// [`DEFAULT_LOG_FILTER`]. Fails if a global subscriber is already set.
pub fn init_logging(directive: Option<&str>) -> Result<LogFilterHandle> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(directive.unwrap_or(DEFAULT_LOG_FILTER))?,
    };
    let (filter_layer, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_timer(LocalTimer))
        .try_init()
        .map_err(|e| Error::config(format!("failed to set global subscriber: {}", e)))?;

    Ok(LogFilterHandle { handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(DEFAULT_LOG_FILTER.contains("ydls=info"));
        assert!(parse_filter(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_invalid_filter() {
        assert!(matches!(
            parse_filter("ydls=loud"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_local_timer_format() {
        let mut out = String::new();
        LocalTimer.format_time(&mut Writer::new(&mut out)).unwrap();
        // 2024-01-02T03:04:05.678+01:00
        assert_eq!(out.len(), 29);
        assert_eq!(&out[10..11], "T");
    }
}
