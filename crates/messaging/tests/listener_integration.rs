//! Integration tests for the payment request listener.

use std::sync::Arc;
use std::time::Duration;

use common::{CustomerId, OrderId, SagaId};
use domain::{Money, PaymentEventKind, PaymentStatus};
use messaging::{InboundRecord, MessagingError, PaymentRequestListener, RecordOutcome};
use rust_decimal_macros::dec;
use saga::{BrokerMode, InMemoryBroker, PaymentSagaCoordinator, ResponseDispatcher};
use store::{InMemoryPaymentStore, PaymentStoreExt};

const REQUEST_TOPIC: &str = "payment-request";
const RESPONSE_TOPIC: &str = "payment-response";
const DLQ_TOPIC: &str = "payment-request-dlq";

struct Fixture {
    store: InMemoryPaymentStore,
    broker: InMemoryBroker,
    listener: PaymentRequestListener<InMemoryPaymentStore>,
    next_offset: std::sync::atomic::AtomicI64,
}

impl Fixture {
    fn new() -> Self {
        let store = InMemoryPaymentStore::new();
        let broker = InMemoryBroker::new();
        let ack_timeout = Duration::from_millis(100);
        let dispatcher =
            ResponseDispatcher::new(Arc::new(broker.clone()), RESPONSE_TOPIC, ack_timeout);
        let coordinator = Arc::new(PaymentSagaCoordinator::new(store.clone(), dispatcher));
        let listener = PaymentRequestListener::new(
            coordinator,
            Arc::new(broker.clone()),
            DLQ_TOPIC,
            ack_timeout,
        );

        Self {
            store,
            broker,
            listener,
            next_offset: std::sync::atomic::AtomicI64::new(0),
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

    fn record(&self, payload: Option<Vec<u8>>) -> InboundRecord {
        InboundRecord {
            topic: REQUEST_TOPIC.to_string(),
            partition: 0,
            offset: self
                .next_offset
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst),
            key: Some(SagaId::new().to_string()),
            payload,
        }
    }

    fn dead_letters(&self) -> Vec<serde_json::Value> {
        self.broker
            .sent_to(DLQ_TOPIC)
            .iter()
            .map(|r| serde_json::from_slice(&r.payload).unwrap())
            .collect()
    }
}

fn request_payload(customer_id: CustomerId, price: &str, status: &str) -> Vec<u8> {
    serde_json::json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "sagaId": SagaId::new().to_string(),
        "customerId": customer_id.to_string(),
        "orderId": OrderId::new().to_string(),
        "price": price,
        "createdAt": "2024-01-01T10:00:00Z",
        "paymentOrderStatus": status,
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn test_valid_request_is_processed() {
    let fx = Fixture::new();
    let customer_id = fx.customer_with(Money::new(dec!(100.00))).await;

    let record = fx.record(Some(request_payload(customer_id, "40.00", "PENDING")));
    let outcome = fx.listener.on_message(&record).await.unwrap();

    match outcome {
        RecordOutcome::Processed(event) => {
            assert_eq!(event.kind, PaymentEventKind::Completed);
            assert_eq!(event.payment_status(), PaymentStatus::Completed);
        }
        other => panic!("expected processed outcome, got {other:?}"),
    }
    let entry = fx.store.credit_entry(customer_id).await.unwrap();
    assert_eq!(entry.total_credit_amount(), Money::new(dec!(60.00)));
    assert!(fx.dead_letters().is_empty());
}

#[tokio::test]
async fn test_undecodable_payload_is_dead_lettered() {
    let fx = Fixture::new();

    let record = fx.record(Some(b"{not json".to_vec()));
    let outcome = fx.listener.on_message(&record).await.unwrap();

    assert!(matches!(outcome, RecordOutcome::DeadLettered { .. }));
    let letters = fx.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0]["sourceTopic"], REQUEST_TOPIC);
    assert_eq!(letters[0]["sourceOffset"], record.offset);
    assert_eq!(letters[0]["payload"], "{not json");
    assert!(fx.store.payments().await.is_empty());
}

#[tokio::test]
async fn test_empty_payload_is_dead_lettered() {
    let fx = Fixture::new();

    let outcome = fx.listener.on_message(&fx.record(None)).await.unwrap();

    assert!(matches!(outcome, RecordOutcome::DeadLettered { .. }));
    assert_eq!(fx.dead_letters()[0]["payload"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_invalid_identifier_is_dead_lettered() {
    let fx = Fixture::new();
    let mut payload: serde_json::Value =
        serde_json::from_slice(&request_payload(CustomerId::new(), "10.00", "PENDING")).unwrap();
    payload["orderId"] = serde_json::json!("not-a-uuid");

    let record = fx.record(Some(payload.to_string().into_bytes()));
    let outcome = fx.listener.on_message(&record).await.unwrap();

    match outcome {
        RecordOutcome::DeadLettered { reason } => assert!(reason.contains("orderId")),
        other => panic!("expected dead letter, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sub_cent_price_is_dead_lettered_without_debit() {
    let fx = Fixture::new();
    let customer_id = fx.customer_with(Money::new(dec!(100.00))).await;

    let record = fx.record(Some(request_payload(customer_id, "0.005", "PENDING")));
    let outcome = fx.listener.on_message(&record).await.unwrap();

    match outcome {
        RecordOutcome::DeadLettered { reason } => assert!(reason.contains("price")),
        other => panic!("expected dead letter, got {other:?}"),
    }
    let entry = fx.store.credit_entry(customer_id).await.unwrap();
    assert_eq!(entry.total_credit_amount(), Money::new(dec!(100.00)));
    assert!(fx.store.payments().await.is_empty());
}

#[tokio::test]
async fn test_missing_credit_entry_is_dead_lettered() {
    let fx = Fixture::new();

    let record = fx.record(Some(request_payload(CustomerId::new(), "10.00", "PENDING")));
    let outcome = fx.listener.on_message(&record).await.unwrap();

    assert!(matches!(outcome, RecordOutcome::DeadLettered { .. }));
    assert_eq!(fx.dead_letters().len(), 1);
    assert!(fx.store.outbox_messages().await.is_empty());
}

#[tokio::test]
async fn test_storage_failure_is_returned_for_redelivery() {
    let fx = Fixture::new();
    let customer_id = fx.customer_with(Money::new(dec!(100.00))).await;
    fx.store.set_fail_on_outbox_save(true);

    let record = fx.record(Some(request_payload(customer_id, "40.00", "PENDING")));
    let err = fx.listener.on_message(&record).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(err, MessagingError::Saga(_)));
    assert!(fx.dead_letters().is_empty());

    // Nothing from the failed attempt was kept.
    let entry = fx.store.credit_entry(customer_id).await.unwrap();
    assert_eq!(entry.total_credit_amount(), Money::new(dec!(100.00)));

    fx.store.set_fail_on_outbox_save(false);
    let outcome = fx.listener.on_message(&record).await.unwrap();
    assert!(matches!(outcome, RecordOutcome::Processed(_)));
}

#[tokio::test]
async fn test_dead_letter_delivery_failure_is_retryable() {
    let fx = Fixture::new();
    fx.broker.set_mode(BrokerMode::Fail("dlq unavailable".to_string()));

    let err = fx
        .listener
        .on_message(&fx.record(Some(b"garbage".to_vec())))
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::Broker(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_batch_reports_one_result_per_record() {
    let fx = Fixture::new();
    let customer_id = fx.customer_with(Money::new(dec!(50.00))).await;

    let records = vec![
        fx.record(Some(request_payload(customer_id, "20.00", "PENDING"))),
        fx.record(Some(b"garbage".to_vec())),
        fx.record(Some(request_payload(customer_id, "45.00", "PENDING"))),
    ];
    let results = fx.listener.receive(&records).await;

    assert_eq!(results.len(), 3);
    match &results[0] {
        Ok(RecordOutcome::Processed(event)) => assert_eq!(event.kind, PaymentEventKind::Completed),
        other => panic!("unexpected first result {other:?}"),
    }
    assert!(matches!(results[1], Ok(RecordOutcome::DeadLettered { .. })));
    match &results[2] {
        Ok(RecordOutcome::Processed(event)) => {
            assert_eq!(event.kind, PaymentEventKind::Failed);
            assert!(!event.failure_messages.is_empty());
        }
        other => panic!("unexpected third result {other:?}"),
    }

    let entry = fx.store.credit_entry(customer_id).await.unwrap();
    assert_eq!(entry.total_credit_amount(), Money::new(dec!(30.00)));
}
