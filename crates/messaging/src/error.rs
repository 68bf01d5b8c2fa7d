//! Messaging error types.

use saga::{BrokerError, SagaError};
use thiserror::Error;

/// Errors raised while turning broker records into saga requests.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The record payload is not a valid message.
    #[error("Cannot decode message: {0}")]
    Decode(#[from] serde_json::Error),

    /// A field holds a value that cannot be used.
    #[error("Invalid value {value:?} for field {field}")]
    InvalidField { field: &'static str, value: String },

    /// The record carried no payload at all.
    #[error("Record has no payload")]
    EmptyPayload,

    /// The saga step rejected the request.
    #[error(transparent)]
    Saga(#[from] SagaError),

    /// The broker did not accept a record.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

impl MessagingError {
    /// Returns true if the same record may be processed successfully later.
    ///
    /// Records failing with a permanent error belong in the dead-letter topic.
    pub fn is_retryable(&self) -> bool {
        match self {
            MessagingError::Decode(_)
            | MessagingError::InvalidField { .. }
            | MessagingError::EmptyPayload => false,
            MessagingError::Saga(err) => err.is_retryable(),
            MessagingError::Broker(_) => true,
            #[cfg(feature = "kafka")]
            MessagingError::Kafka(_) => true,
        }
    }
}
