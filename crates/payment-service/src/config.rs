//! Application configuration loaded from environment variables.

use saga::OutboxConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Topic names used by the payment step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub request: String,
    pub response: String,
    pub dead_letter: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            request: "payment-request".to_string(),
            response: "payment-response".to_string(),
            dead_letter: "payment-request-dlq".to_string(),
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `json` for structured output, anything else for text
/// - `DATABASE_URL` — Postgres connection string; unset runs against memory
/// - `KAFKA_BOOTSTRAP_SERVERS` — broker list; unset uses the in-process broker
/// - `KAFKA_GROUP_ID` — consumer group (default: `"payment-service"`)
/// - `PAYMENT_REQUEST_TOPIC`, `PAYMENT_RESPONSE_TOPIC`, `PAYMENT_DLQ_TOPIC`
///
/// Outbox tuning comes from the `OUTBOX_*` variables read by [`OutboxConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub kafka_bootstrap_servers: Option<String>,
    pub kafka_group_id: String,
    pub topics: Topics,
    pub outbox: OutboxConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: non_empty("DATABASE_URL"),
            kafka_bootstrap_servers: non_empty("KAFKA_BOOTSTRAP_SERVERS"),
            kafka_group_id: non_empty("KAFKA_GROUP_ID").unwrap_or(defaults.kafka_group_id),
            topics: Topics {
                request: non_empty("PAYMENT_REQUEST_TOPIC").unwrap_or(defaults.topics.request),
                response: non_empty("PAYMENT_RESPONSE_TOPIC").unwrap_or(defaults.topics.response),
                dead_letter: non_empty("PAYMENT_DLQ_TOPIC")
                    .unwrap_or(defaults.topics.dead_letter),
            },
            outbox: OutboxConfig::from_lookup(&lookup),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            kafka_bootstrap_servers: None,
            kafka_group_id: "payment-service".to_string(),
            topics: Topics::default(),
            outbox: OutboxConfig::default(),
        }
    }
}
