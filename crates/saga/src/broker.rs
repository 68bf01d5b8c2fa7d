//! Broker abstraction with an explicit two-outcome delivery continuation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

/// A record to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Where the broker stored an acknowledged record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Errors reported by the broker for a single send.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker refused the record.
    #[error("Broker rejected record: {0}")]
    Rejected(String),

    /// No acknowledgment arrived in time.
    #[error("No broker acknowledgment within {0:?}")]
    Timeout(Duration),

    /// The delivery continuation was dropped without being invoked.
    #[error("Broker connection lost before acknowledgment")]
    Disconnected,
}

/// Outcome handed to the delivery continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Acked(DeliveryReceipt),
    Failed(BrokerError),
}

/// Invoked exactly once per send, off the sending task.
pub type DeliveryCallback = Box<dyn FnOnce(DeliveryResult) + Send + 'static>;

/// Outbound side of the message broker.
pub trait MessageBroker: Send + Sync {
    /// Hands `record` to the broker without waiting for it.
    fn send(&self, record: OutboundRecord, on_delivery: DeliveryCallback);
}

/// Sends `record` and waits up to `ack_timeout` for its continuation.
pub async fn deliver(
    broker: &dyn MessageBroker,
    record: OutboundRecord,
    ack_timeout: Duration,
) -> Result<DeliveryReceipt, BrokerError> {
    let (tx, rx) = oneshot::channel();
    broker.send(
        record,
        Box::new(move |result| {
            // The receiver is gone once the wait timed out.
            let _ = tx.send(result);
        }),
    );

    match tokio::time::timeout(ack_timeout, rx).await {
        Ok(Ok(DeliveryResult::Acked(receipt))) => Ok(receipt),
        Ok(Ok(DeliveryResult::Failed(err))) => Err(err),
        Ok(Err(_)) => Err(BrokerError::Disconnected),
        Err(_) => Err(BrokerError::Timeout(ack_timeout)),
    }
}

/// How [`InMemoryBroker`] answers sends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BrokerMode {
    /// Acknowledge every record.
    #[default]
    Ack,
    /// Fail every record with the given reason.
    Fail(String),
    /// Accept records but never invoke the continuation.
    Silent,
}

#[derive(Default)]
struct BrokerState {
    mode: BrokerMode,
    sent: Vec<OutboundRecord>,
    offsets: HashMap<String, i64>,
    parked: Vec<DeliveryCallback>,
}

/// In-memory broker for testing.
///
/// Continuations run on a spawned task, so `send` must be called from
/// inside a tokio runtime.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a broker that acknowledges everything.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes how subsequent sends are answered.
    pub fn set_mode(&self, mode: BrokerMode) {
        self.state().mode = mode;
    }

    /// Returns every record handed to the broker, acknowledged or not.
    pub fn sent(&self) -> Vec<OutboundRecord> {
        self.state().sent.clone()
    }

    /// Returns the records sent to `topic`.
    pub fn sent_to(&self, topic: &str) -> Vec<OutboundRecord> {
        self.state()
            .sent
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state().sent.len()
    }
}

impl MessageBroker for InMemoryBroker {
    fn send(&self, record: OutboundRecord, on_delivery: DeliveryCallback) {
        let mut state = self.state();
        state.sent.push(record.clone());

        let result = match state.mode.clone() {
            BrokerMode::Ack => {
                let offset = state.offsets.entry(record.topic.clone()).or_insert(0);
                let receipt = DeliveryReceipt {
                    topic: record.topic,
                    partition: 0,
                    offset: *offset,
                    timestamp: Some(Utc::now()),
                };
                *offset += 1;
                DeliveryResult::Acked(receipt)
            }
            BrokerMode::Fail(reason) => DeliveryResult::Failed(BrokerError::Rejected(reason)),
            BrokerMode::Silent => {
                state.parked.push(on_delivery);
                return;
            }
        };
        drop(state);

        tokio::spawn(async move { on_delivery(result) });
    }
}
