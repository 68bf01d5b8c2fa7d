//! Outbox rows: payment outcomes staged for publication.

use chrono::{DateTime, Utc};
use common::{OutboxMessageId, SagaId};
use domain::PaymentStatus;
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Publication state of an outbox row.
///
/// ```text
/// Started ──┬──► Completed
///           └──► Failed ──► Started (re-claimed by the publisher)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Staged or in flight.
    Started,
    /// Broker acknowledged delivery. Never changes again.
    Completed,
    /// Last delivery attempt failed; eligible for retry.
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Started => "STARTED",
            OutboxStatus::Completed => "COMPLETED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    /// Returns true if the publisher may still claim a row in this status.
    pub fn is_claimable(&self) -> bool {
        !matches!(self, OutboxStatus::Completed)
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(OutboxStatus::Started),
            "COMPLETED" => Ok(OutboxStatus::Completed),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(StoreError::InvalidColumn {
                column: "outbox_status",
                value: other.to_string(),
            }),
        }
    }
}

/// A payment outcome waiting to be (or already) published.
///
/// `(saga_type, saga_id, payment_status)` is unique across the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: OutboxMessageId,
    pub saga_id: SagaId,
    pub saga_type: String,
    pub created_at: DateTime<Utc>,
    /// Last time the publisher claimed the row.
    pub processed_at: Option<DateTime<Utc>>,
    /// Serialized `PaymentEvent`.
    pub payload: serde_json::Value,
    pub outbox_status: OutboxStatus,
    pub payment_status: PaymentStatus,
    /// Number of claims so far.
    pub attempts: i32,
    /// Optimistic-concurrency counter, bumped on every update.
    pub version: i32,
}

impl OutboxMessage {
    /// Creates a freshly staged row.
    pub fn started(
        saga_id: SagaId,
        saga_type: impl Into<String>,
        payment_status: PaymentStatus,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: OutboxMessageId::new(),
            saga_id,
            saga_type: saga_type.into(),
            created_at: Utc::now(),
            processed_at: None,
            payload,
            outbox_status: OutboxStatus::Started,
            payment_status,
            attempts: 0,
            version: 0,
        }
    }

    /// Returns true if `other` has the same unique key.
    pub fn same_key(&self, other: &OutboxMessage) -> bool {
        self.saga_type == other.saga_type
            && self.saga_id == other.saga_id
            && self.payment_status == other.payment_status
    }
}
