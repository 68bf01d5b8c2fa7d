//! Payment step of the order processing saga.
//!
//! Payment requests are applied exactly once per saga instance and their
//! outcomes are delivered through a transactional outbox:
//!
//! 1. The [`PaymentSagaCoordinator`] validates a request against the
//!    customer's credit ledger and, in one local transaction, stores the
//!    payment, the ledger changes and an outbox row holding the outcome.
//! 2. The [`OutboxPublisher`] claims staged rows and sends them to the
//!    broker, marking each `COMPLETED` on acknowledgment or `FAILED` for a
//!    later retry.
//! 3. The [`OutboxCleaner`] deletes rows that no longer need to be kept.
//!
//! Duplicate requests are answered from the outbox without touching the
//! ledger again.

pub mod broker;
pub mod cleaner;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod order_processing;
pub mod publisher;
pub mod request;
pub mod response;
pub mod scheduler;

pub use broker::{
    BrokerError, BrokerMode, DeliveryCallback, DeliveryReceipt, DeliveryResult, InMemoryBroker,
    MessageBroker, OutboundRecord,
};
pub use cleaner::OutboxCleaner;
pub use config::OutboxConfig;
pub use coordinator::PaymentSagaCoordinator;
pub use dispatcher::ResponseDispatcher;
pub use error::SagaError;
pub use publisher::{OutboxPublisher, SweepReport};
pub use request::{PaymentCommand, PaymentRequest};
pub use response::PaymentResponse;
pub use scheduler::OutboxScheduler;
