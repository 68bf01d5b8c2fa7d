//! Outbox publisher and cleanup settings.

use std::time::Duration;

/// Tuning knobs for the outbox background tasks.
///
/// Reads from environment variables:
/// - `OUTBOX_POLL_INTERVAL_MS` — delay between publish sweeps (default: `1000`)
/// - `OUTBOX_BATCH_SIZE` — rows per publish or cleanup sweep (default: `100`)
/// - `OUTBOX_STALE_AFTER_SECS` — age after which an unacknowledged claim is retried (default: `30`)
/// - `OUTBOX_ACK_TIMEOUT_MS` — how long a send may wait for the broker (default: `5000`)
/// - `OUTBOX_MAX_ATTEMPTS` — claims per row before giving up (default: `10`)
/// - `OUTBOX_CLEANUP_INTERVAL_SECS` — delay between cleanup sweeps (default: `60`)
/// - `OUTBOX_RETENTION_SECS` — age after which finished rows are deleted (default: `3600`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub stale_after: Duration,
    pub ack_timeout: Duration,
    pub max_attempts: i32,
    pub cleanup_interval: Duration,
    pub retention: Duration,
}

impl OutboxConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());

        Self {
            poll_interval: number("OUTBOX_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            batch_size: number("OUTBOX_BATCH_SIZE")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.batch_size),
            stale_after: number("OUTBOX_STALE_AFTER_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stale_after),
            ack_timeout: number("OUTBOX_ACK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ack_timeout),
            max_attempts: number("OUTBOX_MAX_ATTEMPTS")
                .and_then(|n| i32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            cleanup_interval: number("OUTBOX_CLEANUP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            retention: number("OUTBOX_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            stale_after: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(5),
            max_attempts: 10,
            cleanup_interval: Duration::from_secs(60),
            retention: Duration::from_secs(3600),
        }
    }
}

/// Converts a std duration into a chrono one, saturating at zero on overflow.
pub(crate) fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}
