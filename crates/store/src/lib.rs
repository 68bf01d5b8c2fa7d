pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryPaymentStore;
pub use outbox::{OutboxMessage, OutboxStatus};
pub use postgres::PostgresPaymentStore;
pub use query::PublishableQuery;
pub use store::{
    CreditEntryRepository, CreditHistoryRepository, OutboxRepository, PaymentRepository,
    PaymentStore, PaymentStoreExt, UnitOfWork,
};
