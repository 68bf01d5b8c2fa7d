use chrono::{DateTime, Duration, Utc};

use crate::{OutboxMessage, OutboxStatus};

/// Selects outbox rows the publisher should try to send.
///
/// A row is publishable when its attempts are below `max_attempts` and it is
/// either `STARTED` and never claimed (or claimed before `stale_before`), or
/// `FAILED`. Rows come back oldest first.
#[derive(Debug, Clone)]
pub struct PublishableQuery {
    /// Saga type whose rows are scanned.
    pub saga_type: String,

    /// Claims older than this are treated as abandoned.
    pub stale_before: DateTime<Utc>,

    /// Rows with this many attempts are no longer retried.
    pub max_attempts: i32,

    /// Maximum number of rows to return.
    pub limit: usize,
}

impl PublishableQuery {
    /// Creates a query with a zero staleness window, unlimited attempts and a
    /// batch of 100.
    pub fn new(saga_type: impl Into<String>) -> Self {
        Self {
            saga_type: saga_type.into(),
            stale_before: Utc::now(),
            max_attempts: i32::MAX,
            limit: 100,
        }
    }

    /// Treats claims older than `threshold` (relative to now) as stale.
    pub fn stale_after(mut self, threshold: Duration) -> Self {
        self.stale_before = Utc::now() - threshold;
        self
    }

    /// Treats claims made before `instant` as stale.
    pub fn stale_before(mut self, instant: DateTime<Utc>) -> Self {
        self.stale_before = instant;
        self
    }

    /// Skips rows that already used `max_attempts` claims.
    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Limits the number of rows returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Returns true if `message` satisfies this query.
    pub fn matches(&self, message: &OutboxMessage) -> bool {
        if message.saga_type != self.saga_type || message.attempts >= self.max_attempts {
            return false;
        }
        match message.outbox_status {
            OutboxStatus::Started => message
                .processed_at
                .is_none_or(|claimed| claimed < self.stale_before),
            OutboxStatus::Failed => true,
            OutboxStatus::Completed => false,
        }
    }
}
