//! Startup and runtime errors of the service binary.

use messaging::MessagingError;
use metrics_exporter_prometheus::BuildError;
use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Storage unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Broker unavailable: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
