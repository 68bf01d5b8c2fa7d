//! Identifier types shared by every crate in the payment saga workspace.

mod types;

pub use types::{CustomerId, OrderId, OutboxMessageId, PaymentId, SagaId};
