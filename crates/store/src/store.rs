use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, OutboxMessageId, SagaId};
use domain::{CreditEntry, CreditHistory, Money, Payment, PaymentStatus};

use crate::{OutboxMessage, OutboxStatus, PublishableQuery, Result};

/// Persistence for payments.
#[async_trait]
pub trait PaymentRepository: Send {
    /// Inserts the payment or overwrites the row with the same id.
    async fn save_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Returns the most recently created payment for an order.
    async fn find_payment_by_order_id(&mut self, order_id: OrderId) -> Result<Option<Payment>>;
}

/// Persistence for customer credit balances.
#[async_trait]
pub trait CreditEntryRepository: Send {
    /// Inserts the entry or overwrites the balance of the customer's entry.
    async fn save_credit_entry(&mut self, entry: &CreditEntry) -> Result<()>;

    /// Loads a customer's entry. Adapters lock the row for the rest of the
    /// unit of work.
    async fn find_credit_entry_by_customer_id(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<CreditEntry>>;
}

/// Persistence for the append-only credit ledger.
#[async_trait]
pub trait CreditHistoryRepository: Send {
    /// Appends a ledger record.
    async fn save_credit_history(&mut self, history: &CreditHistory) -> Result<()>;

    /// Returns the customer's ledger oldest first, or `None` when it is empty.
    async fn find_credit_history_by_customer_id(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<Vec<CreditHistory>>>;
}

/// Persistence for outbox rows.
#[async_trait]
pub trait OutboxRepository: Send {
    /// Serializes units of work that touch the same saga until commit.
    async fn lock_saga(&mut self, saga_type: &str, saga_id: SagaId) -> Result<()>;

    /// Returns the row for the saga whose payment status is one of
    /// `payment_statuses`.
    async fn find_outbox_by_saga_id_and_type(
        &mut self,
        saga_type: &str,
        saga_id: SagaId,
        payment_statuses: &[PaymentStatus],
    ) -> Result<Option<OutboxMessage>>;

    /// Returns all rows of a saga type in the given publication state.
    async fn find_outbox_by_outbox_status(
        &mut self,
        saga_type: &str,
        outbox_status: OutboxStatus,
    ) -> Result<Vec<OutboxMessage>>;

    /// Returns rows the publisher should send, oldest first.
    async fn find_publishable_outbox(
        &mut self,
        query: &PublishableQuery,
    ) -> Result<Vec<OutboxMessage>>;

    /// Inserts a new row.
    ///
    /// Fails with `StoreError::DuplicateOutboxMessage` when the saga already
    /// has a row for the same payment status.
    async fn save_outbox_message(&mut self, message: &OutboxMessage) -> Result<()>;

    /// Claims a row for sending.
    ///
    /// Succeeds only if the row is still at `expected_version` and not
    /// `COMPLETED`. The claimed row is `STARTED`, stamped with `now`, and has
    /// its attempts and version bumped. Returns `None` when another claimer
    /// won.
    async fn claim_outbox_message(
        &mut self,
        id: OutboxMessageId,
        expected_version: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<OutboxMessage>>;

    /// Moves a row from `from` to `to` if it is still at `expected_version`.
    ///
    /// Returns false when the guard did not match. Rows that are `COMPLETED`
    /// never change.
    async fn update_outbox_status(
        &mut self,
        id: OutboxMessageId,
        expected_version: i32,
        from: OutboxStatus,
        to: OutboxStatus,
    ) -> Result<bool>;

    /// Deletes `COMPLETED` rows and `FAILED` rows with at least
    /// `max_attempts` attempts created before `older_than`, at most `limit`
    /// of them. Returns the number of deleted rows.
    async fn delete_outbox_older_than(
        &mut self,
        saga_type: &str,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: usize,
    ) -> Result<u64>;
}

/// A transaction spanning every repository.
///
/// Nothing is visible to other units of work until [`UnitOfWork::commit`].
/// Dropping a unit of work without committing rolls it back.
#[async_trait]
pub trait UnitOfWork:
    PaymentRepository + CreditEntryRepository + CreditHistoryRepository + OutboxRepository
{
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Core trait for payment store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Starts a unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// Extension trait providing single-statement operations, each in its own
/// unit of work.
#[async_trait]
pub trait PaymentStoreExt: PaymentStore {
    /// Seeds a customer with an opening balance and the matching CREDIT
    /// ledger record.
    async fn provision_customer(
        &self,
        customer_id: CustomerId,
        opening_balance: Money,
    ) -> Result<CreditEntry> {
        let entry = CreditEntry::new(customer_id, opening_balance);
        let mut uow = self.begin().await?;
        uow.save_credit_entry(&entry).await?;
        uow.save_credit_history(&CreditHistory::credit(customer_id, opening_balance))
            .await?;
        uow.commit().await?;
        Ok(entry)
    }

    async fn publishable_outbox(&self, query: &PublishableQuery) -> Result<Vec<OutboxMessage>> {
        let mut uow = self.begin().await?;
        let rows = uow.find_publishable_outbox(query).await?;
        uow.commit().await?;
        Ok(rows)
    }

    async fn claim_outbox(
        &self,
        id: OutboxMessageId,
        expected_version: i32,
    ) -> Result<Option<OutboxMessage>> {
        let mut uow = self.begin().await?;
        let claimed = uow
            .claim_outbox_message(id, expected_version, Utc::now())
            .await?;
        uow.commit().await?;
        Ok(claimed)
    }

    async fn complete_outbox(&self, claimed: &OutboxMessage) -> Result<bool> {
        self.transition_outbox(claimed, OutboxStatus::Completed).await
    }

    async fn fail_outbox(&self, claimed: &OutboxMessage) -> Result<bool> {
        self.transition_outbox(claimed, OutboxStatus::Failed).await
    }

    async fn transition_outbox(&self, claimed: &OutboxMessage, to: OutboxStatus) -> Result<bool> {
        let mut uow = self.begin().await?;
        let updated = uow
            .update_outbox_status(claimed.id, claimed.version, OutboxStatus::Started, to)
            .await?;
        uow.commit().await?;
        Ok(updated)
    }

    async fn purge_outbox(
        &self,
        saga_type: &str,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: usize,
    ) -> Result<u64> {
        let mut uow = self.begin().await?;
        let deleted = uow
            .delete_outbox_older_than(saga_type, older_than, max_attempts, limit)
            .await?;
        uow.commit().await?;
        Ok(deleted)
    }
}

// Blanket implementation for all PaymentStore implementations
impl<T: PaymentStore + ?Sized> PaymentStoreExt for T {}
