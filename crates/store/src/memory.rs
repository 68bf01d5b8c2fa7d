use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, OutboxMessageId, SagaId};
use domain::{CreditEntry, CreditHistory, Payment, PaymentStatus};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    OutboxMessage, OutboxStatus, PublishableQuery, Result, StoreError,
    store::{
        CreditEntryRepository, CreditHistoryRepository, OutboxRepository, PaymentRepository,
        PaymentStore, UnitOfWork,
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    payments: Vec<Payment>,
    credit_entries: HashMap<CustomerId, CreditEntry>,
    credit_histories: Vec<CreditHistory>,
    outbox: Vec<OutboxMessage>,
}

/// In-memory payment store implementation for testing.
///
/// Units of work are serialized: `begin` waits until the previous unit of
/// work commits or is dropped, then works on a private copy of the state
/// that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    state: Arc<Mutex<MemoryState>>,
    fail_outbox_saves: Arc<AtomicBool>,
}

impl InMemoryPaymentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every outbox insert fail with `StoreError::Backend` until
    /// switched off again.
    pub fn set_fail_on_outbox_save(&self, fail: bool) {
        self.fail_outbox_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    pub async fn credit_entry(&self, customer_id: CustomerId) -> Option<CreditEntry> {
        self.state
            .lock()
            .await
            .credit_entries
            .get(&customer_id)
            .cloned()
    }

    pub async fn credit_history(&self, customer_id: CustomerId) -> Vec<CreditHistory> {
        self.state
            .lock()
            .await
            .credit_histories
            .iter()
            .filter(|h| h.customer_id == customer_id)
            .cloned()
            .collect()
    }

    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.clone()
    }

    /// Edits a stored outbox row in place, bypassing every guard.
    pub async fn modify_outbox_message(
        &self,
        id: OutboxMessageId,
        modify: impl FnOnce(&mut OutboxMessage),
    ) -> bool {
        let mut state = self.state.lock().await;
        match state.outbox.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                modify(message);
                true
            }
            None => false,
        }
    }

    /// Clears all stored data.
    pub async fn clear(&self) {
        *self.state.lock().await = MemoryState::default();
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = MemoryState::clone(&guard);
        Ok(Box::new(InMemoryUnitOfWork {
            guard,
            working,
            fail_outbox_saves: Arc::clone(&self.fail_outbox_saves),
        }))
    }
}

/// Unit of work over [`InMemoryPaymentStore`].
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_outbox_saves: Arc<AtomicBool>,
}

#[async_trait]
impl PaymentRepository for InMemoryUnitOfWork {
    async fn save_payment(&mut self, payment: &Payment) -> Result<()> {
        let payments = &mut self.working.payments;
        match payments.iter_mut().find(|p| p.id() == payment.id()) {
            Some(existing) => *existing = payment.clone(),
            None => payments.push(payment.clone()),
        }
        Ok(())
    }

    async fn find_payment_by_order_id(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.order_id() == order_id)
            .max_by_key(|p| p.created_at())
            .cloned())
    }
}

#[async_trait]
impl CreditEntryRepository for InMemoryUnitOfWork {
    async fn save_credit_entry(&mut self, entry: &CreditEntry) -> Result<()> {
        if entry.total_credit_amount().is_negative() {
            return Err(StoreError::Backend(format!(
                "credit entry for customer {} would be negative",
                entry.customer_id
            )));
        }
        self.working
            .credit_entries
            .insert(entry.customer_id, entry.clone());
        Ok(())
    }

    async fn find_credit_entry_by_customer_id(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<CreditEntry>> {
        Ok(self.working.credit_entries.get(&customer_id).cloned())
    }
}

#[async_trait]
impl CreditHistoryRepository for InMemoryUnitOfWork {
    async fn save_credit_history(&mut self, history: &CreditHistory) -> Result<()> {
        self.working.credit_histories.push(history.clone());
        Ok(())
    }

    async fn find_credit_history_by_customer_id(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<Vec<CreditHistory>>> {
        let histories: Vec<_> = self
            .working
            .credit_histories
            .iter()
            .filter(|h| h.customer_id == customer_id)
            .cloned()
            .collect();
        Ok((!histories.is_empty()).then_some(histories))
    }
}

#[async_trait]
impl OutboxRepository for InMemoryUnitOfWork {
    async fn lock_saga(&mut self, _saga_type: &str, _saga_id: SagaId) -> Result<()> {
        // The unit of work already holds the store-wide lock.
        Ok(())
    }

    async fn find_outbox_by_saga_id_and_type(
        &mut self,
        saga_type: &str,
        saga_id: SagaId,
        payment_statuses: &[PaymentStatus],
    ) -> Result<Option<OutboxMessage>> {
        Ok(self
            .working
            .outbox
            .iter()
            .find(|m| {
                m.saga_type == saga_type
                    && m.saga_id == saga_id
                    && payment_statuses.contains(&m.payment_status)
            })
            .cloned())
    }

    async fn find_outbox_by_outbox_status(
        &mut self,
        saga_type: &str,
        outbox_status: OutboxStatus,
    ) -> Result<Vec<OutboxMessage>> {
        Ok(self
            .working
            .outbox
            .iter()
            .filter(|m| m.saga_type == saga_type && m.outbox_status == outbox_status)
            .cloned()
            .collect())
    }

    async fn find_publishable_outbox(
        &mut self,
        query: &PublishableQuery,
    ) -> Result<Vec<OutboxMessage>> {
        let mut rows: Vec<_> = self
            .working
            .outbox
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        rows.truncate(query.limit);
        Ok(rows)
    }

    async fn save_outbox_message(&mut self, message: &OutboxMessage) -> Result<()> {
        if self.fail_outbox_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("outbox insert rejected".to_string()));
        }
        if self.working.outbox.iter().any(|m| m.same_key(message)) {
            return Err(StoreError::DuplicateOutboxMessage {
                saga_type: message.saga_type.clone(),
                saga_id: message.saga_id,
                payment_status: message.payment_status,
            });
        }
        self.working.outbox.push(message.clone());
        Ok(())
    }

    async fn claim_outbox_message(
        &mut self,
        id: OutboxMessageId,
        expected_version: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<OutboxMessage>> {
        let Some(message) = self.working.outbox.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if message.version != expected_version || !message.outbox_status.is_claimable() {
            return Ok(None);
        }
        message.outbox_status = OutboxStatus::Started;
        message.processed_at = Some(now);
        message.attempts += 1;
        message.version += 1;
        Ok(Some(message.clone()))
    }

    async fn update_outbox_status(
        &mut self,
        id: OutboxMessageId,
        expected_version: i32,
        from: OutboxStatus,
        to: OutboxStatus,
    ) -> Result<bool> {
        let Some(message) = self.working.outbox.iter_mut().find(|m| m.id == id) else {
            return Ok(false);
        };
        if message.version != expected_version
            || message.outbox_status != from
            || message.outbox_status == OutboxStatus::Completed
        {
            return Ok(false);
        }
        message.outbox_status = to;
        message.version += 1;
        Ok(true)
    }

    async fn delete_outbox_older_than(
        &mut self,
        saga_type: &str,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: usize,
    ) -> Result<u64> {
        let mut doomed: Vec<_> = self
            .working
            .outbox
            .iter()
            .filter(|m| {
                m.saga_type == saga_type
                    && m.created_at < older_than
                    && (m.outbox_status == OutboxStatus::Completed
                        || (m.outbox_status == OutboxStatus::Failed
                            && m.attempts >= max_attempts))
            })
            .map(|m| (m.created_at, m.id))
            .collect();
        doomed.sort();
        doomed.truncate(limit);

        self.working
            .outbox
            .retain(|m| !doomed.iter().any(|(_, id)| *id == m.id));
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
