//! Broker boundary of the payment service.
//!
//! Decodes payment requests from the order service, hands them to the saga
//! coordinator and routes records that can never succeed to a dead-letter
//! topic. The Kafka adapter is available behind the `kafka` feature.

pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod listener;
pub mod message;

pub use error::MessagingError;
pub use listener::{InboundRecord, PaymentRequestListener, RecordOutcome};
pub use message::{PaymentOrderStatus, PaymentRequestMessage, PaymentResponseMessage};
