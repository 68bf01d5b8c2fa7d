//! Integration tests for the payment saga step and its outbox.

use std::sync::Arc;
use std::time::Duration;

use common::{CustomerId, OrderId, SagaId};
use domain::{Money, PaymentEventKind, PaymentStatus, TransactionType};
use rust_decimal_macros::dec;
use saga::{
    BrokerMode, InMemoryBroker, OutboxCleaner, OutboxConfig, OutboxPublisher, OutboxScheduler,
    PaymentRequest, PaymentResponse, PaymentSagaCoordinator, ResponseDispatcher, SagaError,
    order_processing,
};
use store::{InMemoryPaymentStore, OutboxStatus, PaymentStoreExt};

const RESPONSE_TOPIC: &str = "payment-response";

struct TestHarness {
    store: InMemoryPaymentStore,
    broker: InMemoryBroker,
    config: OutboxConfig,
    coordinator: Arc<PaymentSagaCoordinator<InMemoryPaymentStore>>,
    publisher: OutboxPublisher<InMemoryPaymentStore>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(OutboxConfig {
            ack_timeout: Duration::from_millis(100),
            max_attempts: 3,
            ..OutboxConfig::default()
        })
    }

    fn with_config(config: OutboxConfig) -> Self {
        let store = InMemoryPaymentStore::new();
        let broker = InMemoryBroker::new();
        let dispatcher = ResponseDispatcher::new(
            Arc::new(broker.clone()),
            RESPONSE_TOPIC,
            config.ack_timeout,
        );
        let coordinator = Arc::new(PaymentSagaCoordinator::new(store.clone(), dispatcher));
        let publisher = OutboxPublisher::new(
            store.clone(),
            Arc::new(broker.clone()),
            config.clone(),
            RESPONSE_TOPIC,
        );

        Self {
            store,
            broker,
            config,
            coordinator,
            publisher,
        }
    }

    async fn customer_with(&self, balance: Money) -> CustomerId {
        let customer_id = CustomerId::new();
        self.store
            .provision_customer(customer_id, balance)
            .await
            .unwrap();
        customer_id
    }

    async fn balance(&self, customer_id: CustomerId) -> Money {
        self.store
            .credit_entry(customer_id)
            .await
            .unwrap()
            .total_credit_amount()
    }

    fn responses(&self) -> Vec<PaymentResponse> {
        self.broker
            .sent_to(RESPONSE_TOPIC)
            .iter()
            .map(|r| serde_json::from_slice(&r.payload).unwrap())
            .collect()
    }
}

fn initiate(customer_id: CustomerId, price: Money) -> PaymentRequest {
    PaymentRequest::initiate(SagaId::new(), OrderId::new(), customer_id, price)
}

fn cancel_of(request: &PaymentRequest) -> PaymentRequest {
    PaymentRequest::cancel(
        request.saga_id,
        request.order_id,
        request.customer_id,
        request.price,
    )
}

// ============================================================================
// End-to-end scenario
// ============================================================================

#[tokio::test]
async fn test_payment_lifecycle_scenario() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;

    // Pay 60.00 out of 100.00
    let first = initiate(customer_id, Money::new(dec!(60.00)));
    let event = h.coordinator.persist_payment(&first).await.unwrap();
    assert_eq!(event.kind, PaymentEventKind::Completed);
    assert_eq!(h.balance(customer_id).await, Money::new(dec!(40.00)));

    let history = h.store.credit_history(customer_id).await;
    let last = history.last().unwrap();
    assert_eq!(last.transaction_type, TransactionType::Debit);
    assert_eq!(last.amount, Money::new(dec!(60.00)));

    let report = h.publisher.publish_pending().await.unwrap();
    assert_eq!(report.published, 1);
    let rows = h.store.outbox_messages().await;
    assert_eq!(rows[0].outbox_status, OutboxStatus::Completed);
    assert_eq!(h.responses()[0].payment_status, PaymentStatus::Completed);

    // 50.00 no longer fits
    let second = initiate(customer_id, Money::new(dec!(50.00)));
    let event = h.coordinator.persist_payment(&second).await.unwrap();
    assert_eq!(event.kind, PaymentEventKind::Failed);
    assert!(
        event
            .failure_messages
            .iter()
            .any(|m| m.contains("insufficient funds"))
    );
    assert_eq!(h.balance(customer_id).await, Money::new(dec!(40.00)));
    assert_eq!(h.store.credit_history(customer_id).await.len(), 2);

    // Compensate the first payment
    let event = h
        .coordinator
        .persist_cancel_payment(&cancel_of(&first))
        .await
        .unwrap();
    assert_eq!(event.kind, PaymentEventKind::Cancelled);
    assert_eq!(h.balance(customer_id).await, Money::new(dec!(100.00)));
    let last = h.store.credit_history(customer_id).await.pop().unwrap();
    assert_eq!(last.transaction_type, TransactionType::Credit);
    assert_eq!(last.amount, Money::new(dec!(60.00)));

    let report = h.publisher.publish_pending().await.unwrap();
    assert_eq!(report.published, 2);
    let statuses: Vec<_> = h.responses().iter().map(|r| r.payment_status).collect();
    assert_eq!(
        statuses,
        vec![
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled
        ]
    );
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_duplicate_after_publish_resends_identical_response() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    let request = initiate(customer_id, Money::new(dec!(60.00)));

    let original = h.coordinator.handle(&request).await.unwrap();
    h.publisher.publish_pending().await.unwrap();

    let replayed = h.coordinator.handle(&request).await.unwrap();
    assert_eq!(replayed, original);
    assert_eq!(h.balance(customer_id).await, Money::new(dec!(40.00)));
    assert_eq!(h.store.credit_history(customer_id).await.len(), 2);
    assert_eq!(h.store.outbox_messages().await.len(), 1);

    let sent = h.broker.sent_to(RESPONSE_TOPIC);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].payload, sent[1].payload);
    assert_eq!(sent[0].key, sent[1].key);
}

#[tokio::test]
async fn test_duplicate_before_publish_is_not_resent() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    let request = initiate(customer_id, Money::new(dec!(60.00)));

    let original = h.coordinator.handle(&request).await.unwrap();
    let replayed = h.coordinator.handle(&request).await.unwrap();

    assert_eq!(replayed, original);
    assert_eq!(h.broker.sent_count(), 0);

    // The publisher still delivers the staged row exactly once.
    h.publisher.publish_pending().await.unwrap();
    assert_eq!(h.broker.sent_count(), 1);
}

#[tokio::test]
async fn test_concurrent_duplicates_debit_once() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    let request = initiate(customer_id, Money::new(dec!(60.00)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&h.coordinator);
            let request = request.clone();
            tokio::spawn(async move { coordinator.persist_payment(&request).await })
        })
        .collect();

    let mut payment_ids = Vec::new();
    for handle in handles {
        let event = handle.await.unwrap().unwrap();
        payment_ids.push(event.payment.id());
    }
    payment_ids.dedup();
    assert_eq!(payment_ids.len(), 1);

    assert_eq!(h.balance(customer_id).await, Money::new(dec!(40.00)));
    assert_eq!(h.store.payments().await.len(), 1);
    assert_eq!(h.store.outbox_messages().await.len(), 1);

    h.publisher.publish_pending().await.unwrap();
    let rows = h.store.outbox_messages().await;
    assert_eq!(rows[0].outbox_status, OutboxStatus::Completed);
    assert_eq!(h.broker.sent_count(), 1);
}

#[tokio::test]
async fn test_duplicate_failed_outcome_is_replayed() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(10.00))).await;
    let request = initiate(customer_id, Money::new(dec!(60.00)));

    let first = h.coordinator.handle(&request).await.unwrap();
    let second = h.coordinator.handle(&request).await.unwrap();

    assert_eq!(first.kind, PaymentEventKind::Failed);
    assert_eq!(second, first);
    assert_eq!(h.store.payments().await.len(), 1);
}

#[tokio::test]
async fn test_sub_cent_price_fails_and_ledger_stays_reconciled() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;

    let event = h
        .coordinator
        .handle(&initiate(customer_id, Money::new(dec!(0.005))))
        .await
        .unwrap();
    assert_eq!(event.kind, PaymentEventKind::Failed);
    assert_eq!(h.balance(customer_id).await, Money::new(dec!(100.00)));

    // The next payment still reconciles against the history.
    let event = h
        .coordinator
        .handle(&initiate(customer_id, Money::new(dec!(10.00))))
        .await
        .unwrap();
    assert_eq!(event.kind, PaymentEventKind::Completed);
    let history = h.store.credit_history(customer_id).await;
    assert_eq!(
        domain::CreditHistory::balance(&history),
        h.balance(customer_id).await
    );
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_missing_credit_entry_is_fatal() {
    let h = TestHarness::new();
    let request = initiate(CustomerId::new(), Money::new(dec!(10.00)));

    let err = h.coordinator.handle(&request).await.unwrap_err();
    assert!(matches!(err, SagaError::CreditEntryNotFound(_)));
    assert!(!err.is_retryable());
    assert!(h.store.payments().await.is_empty());
    assert!(h.store.outbox_messages().await.is_empty());
}

#[tokio::test]
async fn test_cancel_without_payment_is_fatal() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    let request = PaymentRequest::cancel(
        SagaId::new(),
        OrderId::new(),
        customer_id,
        Money::new(dec!(10.00)),
    );

    let err = h.coordinator.handle(&request).await.unwrap_err();
    assert!(matches!(err, SagaError::PaymentNotFound(id) if id == request.order_id));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_cancel_of_failed_payment_reports_failure() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(10.00))).await;
    let rejected = initiate(customer_id, Money::new(dec!(60.00)));
    h.coordinator.handle(&rejected).await.unwrap();

    // A fresh saga compensating the rejected order.
    let cancel = PaymentRequest::cancel(
        SagaId::new(),
        rejected.order_id,
        customer_id,
        rejected.price,
    );
    let event = h.coordinator.handle(&cancel).await.unwrap();

    assert_eq!(event.kind, PaymentEventKind::Failed);
    assert_eq!(h.balance(customer_id).await, Money::new(dec!(10.00)));
    assert_eq!(h.store.credit_history(customer_id).await.len(), 1);
}

#[tokio::test]
async fn test_storage_failure_rolls_back_everything() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    h.store.set_fail_on_outbox_save(true);

    let request = initiate(customer_id, Money::new(dec!(60.00)));
    let err = h.coordinator.handle(&request).await.unwrap_err();
    assert!(err.is_retryable());

    assert_eq!(h.balance(customer_id).await, Money::new(dec!(100.00)));
    assert_eq!(h.store.credit_history(customer_id).await.len(), 1);
    assert!(h.store.payments().await.is_empty());

    // Redelivery after the outage succeeds.
    h.store.set_fail_on_outbox_save(false);
    let event = h.coordinator.handle(&request).await.unwrap();
    assert_eq!(event.kind, PaymentEventKind::Completed);
    assert_eq!(h.balance(customer_id).await, Money::new(dec!(40.00)));
}

#[tokio::test]
async fn test_balance_conserved_over_mixed_sequence() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    let prices = [dec!(30.00), dec!(45.50), dec!(50.00), dec!(24.50), dec!(0.01)];

    let mut accepted = Vec::new();
    for price in prices {
        let request = initiate(customer_id, Money::new(price));
        if h.coordinator.handle(&request).await.unwrap().is_success() {
            accepted.push(request);
        }
        let balance = h.balance(customer_id).await;
        assert!(!balance.is_negative());
    }
    for request in accepted.iter().step_by(2) {
        h.coordinator.handle(&cancel_of(request)).await.unwrap();
    }

    let history = h.store.credit_history(customer_id).await;
    assert_eq!(
        domain::CreditHistory::balance(&history),
        h.balance(customer_id).await
    );
}

// ============================================================================
// Publisher
// ============================================================================

#[tokio::test]
async fn test_racing_sweeps_publish_once() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    for _ in 0..5 {
        h.coordinator
            .handle(&initiate(customer_id, Money::new(dec!(1.00))))
            .await
            .unwrap();
    }

    let rival = OutboxPublisher::new(
        h.store.clone(),
        Arc::new(h.broker.clone()),
        h.config.clone(),
        RESPONSE_TOPIC,
    );
    let (a, b) = tokio::join!(h.publisher.publish_pending(), rival.publish_pending());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.published + b.published, 5);
    assert_eq!(h.broker.sent_count(), 5);
    assert!(
        h.store
            .outbox_messages()
            .await
            .iter()
            .all(|m| m.outbox_status == OutboxStatus::Completed)
    );
}

#[tokio::test]
async fn test_broker_failure_marks_failed_and_retries() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    h.coordinator
        .handle(&initiate(customer_id, Money::new(dec!(60.00))))
        .await
        .unwrap();

    h.broker.set_mode(BrokerMode::Fail("leader not available".into()));
    let report = h.publisher.publish_pending().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(
        h.store.outbox_messages().await[0].outbox_status,
        OutboxStatus::Failed
    );

    h.broker.set_mode(BrokerMode::Ack);
    let report = h.publisher.publish_pending().await.unwrap();
    assert_eq!(report.published, 1);

    let row = &h.store.outbox_messages().await[0];
    assert_eq!(row.outbox_status, OutboxStatus::Completed);
    assert_eq!(row.attempts, 2);
}

#[tokio::test]
async fn test_missing_ack_times_out_as_failed() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    h.coordinator
        .handle(&initiate(customer_id, Money::new(dec!(60.00))))
        .await
        .unwrap();

    h.broker.set_mode(BrokerMode::Silent);
    let report = h.publisher.publish_pending().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(
        h.store.outbox_messages().await[0].outbox_status,
        OutboxStatus::Failed
    );
}

#[tokio::test]
async fn test_exhausted_rows_are_left_alone() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    h.coordinator
        .handle(&initiate(customer_id, Money::new(dec!(60.00))))
        .await
        .unwrap();

    h.broker.set_mode(BrokerMode::Fail("down".into()));
    for _ in 0..h.config.max_attempts {
        h.publisher.publish_pending().await.unwrap();
    }
    let report = h.publisher.publish_pending().await.unwrap();

    assert_eq!(report.selected, 0);
    assert_eq!(h.broker.sent_count(), h.config.max_attempts as usize);
}

#[tokio::test]
async fn test_stale_claim_is_picked_up_again() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    h.coordinator
        .handle(&initiate(customer_id, Money::new(dec!(60.00))))
        .await
        .unwrap();

    // Simulate a publisher that claimed the row and died.
    let row = h.store.outbox_messages().await.remove(0);
    h.store
        .modify_outbox_message(row.id, |m| {
            m.processed_at = Some(chrono::Utc::now() - chrono::Duration::seconds(120));
            m.attempts = 1;
            m.version = 1;
        })
        .await;

    let report = h.publisher.publish_pending().await.unwrap();
    assert_eq!(report.published, 1);
}

#[tokio::test]
async fn test_fresh_claim_is_not_republished() {
    let h = TestHarness::new();
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    h.coordinator
        .handle(&initiate(customer_id, Money::new(dec!(60.00))))
        .await
        .unwrap();

    let row = h.store.outbox_messages().await.remove(0);
    h.store
        .modify_outbox_message(row.id, |m| {
            m.processed_at = Some(chrono::Utc::now());
            m.attempts = 1;
        })
        .await;

    let report = h.publisher.publish_pending().await.unwrap();
    assert_eq!(report.selected, 0);
    assert_eq!(h.broker.sent_count(), 0);
}

// ============================================================================
// Cleanup and scheduling
// ============================================================================

#[tokio::test]
async fn test_cleaner_removes_published_rows() {
    let h = TestHarness::with_config(OutboxConfig {
        retention: Duration::ZERO,
        ..OutboxConfig::default()
    });
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    h.coordinator
        .handle(&initiate(customer_id, Money::new(dec!(60.00))))
        .await
        .unwrap();
    h.coordinator
        .handle(&initiate(customer_id, Money::new(dec!(10.00))))
        .await
        .unwrap();

    // Publish only the first row.
    let first = h.store.outbox_messages().await.remove(0);
    h.store
        .modify_outbox_message(first.id, |m| m.outbox_status = OutboxStatus::Completed)
        .await;

    let cleaner = OutboxCleaner::new(h.store.clone(), h.config.clone());
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(cleaner.clean().await.unwrap(), 1);

    let remaining = h.store.outbox_messages().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].outbox_status, OutboxStatus::Started);
}

#[tokio::test]
async fn test_scheduler_publishes_in_background() {
    let config = OutboxConfig {
        poll_interval: Duration::from_millis(10),
        cleanup_interval: Duration::from_secs(60),
        ..OutboxConfig::default()
    };
    let h = TestHarness::with_config(config.clone());
    let customer_id = h.customer_with(Money::new(dec!(100.00))).await;
    h.coordinator
        .handle(&initiate(customer_id, Money::new(dec!(60.00))))
        .await
        .unwrap();

    let scheduler = OutboxScheduler::start(
        Arc::new(OutboxPublisher::new(
            h.store.clone(),
            Arc::new(h.broker.clone()),
            config.clone(),
            RESPONSE_TOPIC,
        )),
        Arc::new(OutboxCleaner::new(h.store.clone(), config.clone())),
        config.poll_interval,
        config.cleanup_interval,
    );

    let published = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if h.broker.sent_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    scheduler.shutdown().await;

    assert!(published.is_ok());
    let rows = h.store.outbox_messages().await;
    assert_eq!(h.responses()[0].saga_id, rows[0].saga_id);
    assert_eq!(rows[0].saga_type, order_processing::SAGA_TYPE);
}
