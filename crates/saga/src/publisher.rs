//! Outbox publisher: sends staged payment outcomes to the broker.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use store::{OutboxMessage, PaymentStore, PaymentStoreExt, PublishableQuery};

use crate::broker::{MessageBroker, deliver};
use crate::config::{OutboxConfig, chrono_duration};
use crate::error::Result;
use crate::order_processing;
use crate::response::PaymentResponse;

/// What one publish sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rows the sweep found eligible.
    pub selected: usize,
    /// Rows this sweep won the claim for.
    pub claimed: usize,
    /// Claimed rows the broker acknowledged.
    pub published: usize,
    /// Claimed rows that failed or timed out.
    pub failed: usize,
}

/// Publishes outbox rows and records the broker's verdict on each.
///
/// Each eligible row is claimed with a version-guarded update before it is
/// sent, so racing publishers send a row at most once per claim.
pub struct OutboxPublisher<S>
where
    S: PaymentStore,
{
    store: S,
    broker: Arc<dyn MessageBroker>,
    config: OutboxConfig,
    topic: String,
}

impl<S> OutboxPublisher<S>
where
    S: PaymentStore,
{
    /// Creates a new publisher sending to `topic`.
    pub fn new(
        store: S,
        broker: Arc<dyn MessageBroker>,
        config: OutboxConfig,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            broker,
            config,
            topic: topic.into(),
        }
    }

    /// Runs one sweep and waits for every delivery it started.
    #[tracing::instrument(skip(self), fields(saga_type = order_processing::SAGA_TYPE))]
    pub async fn publish_pending(&self) -> Result<SweepReport> {
        let start = Instant::now();
        let query = PublishableQuery::new(order_processing::SAGA_TYPE)
            .stale_after(chrono_duration(self.config.stale_after))
            .max_attempts(self.config.max_attempts)
            .limit(self.config.batch_size);

        let rows = self.store.publishable_outbox(&query).await?;
        let mut report = SweepReport {
            selected: rows.len(),
            ..SweepReport::default()
        };

        let mut deliveries = Vec::with_capacity(rows.len());
        for row in rows {
            match self.store.claim_outbox(row.id, row.version).await? {
                Some(claimed) => deliveries.push(self.deliver_claimed(claimed)),
                None => tracing::debug!(outbox_id = %row.id, "row claimed by another publisher"),
            }
        }
        report.claimed = deliveries.len();

        for delivered in join_all(deliveries).await {
            if delivered? {
                report.published += 1;
            } else {
                report.failed += 1;
            }
        }

        metrics::histogram!("outbox_sweep_duration_seconds").record(start.elapsed().as_secs_f64());
        if report.claimed > 0 {
            tracing::info!(
                selected = report.selected,
                published = report.published,
                failed = report.failed,
                "outbox sweep finished"
            );
        }
        Ok(report)
    }

    /// Sends a claimed row and marks it `COMPLETED` or `FAILED`.
    async fn deliver_claimed(&self, claimed: OutboxMessage) -> Result<bool> {
        let record = match PaymentResponse::from_outbox(&claimed)
            .and_then(|response| response.to_record(&self.topic))
        {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(
                    outbox_id = %claimed.id,
                    saga_id = %claimed.saga_id,
                    error = %err,
                    "outbox payload cannot be encoded"
                );
                self.store.fail_outbox(&claimed).await?;
                metrics::counter!("outbox_failed_total").increment(1);
                return Ok(false);
            }
        };

        match deliver(self.broker.as_ref(), record, self.config.ack_timeout).await {
            Ok(receipt) => {
                if !self.store.complete_outbox(&claimed).await? {
                    tracing::warn!(outbox_id = %claimed.id, "outbox row changed while in flight");
                }
                metrics::counter!("outbox_published_total").increment(1);
                tracing::info!(
                    saga_id = %claimed.saga_id,
                    payment_status = %claimed.payment_status,
                    topic = %receipt.topic,
                    partition = receipt.partition,
                    offset = receipt.offset,
                    timestamp = ?receipt.timestamp,
                    "payment response published"
                );
                Ok(true)
            }
            Err(err) => {
                tracing::error!(
                    saga_id = %claimed.saga_id,
                    attempts = claimed.attempts,
                    error = %err,
                    "error while sending payment response"
                );
                self.store.fail_outbox(&claimed).await?;
                metrics::counter!("outbox_failed_total").increment(1);
                Ok(false)
            }
        }
    }
}
