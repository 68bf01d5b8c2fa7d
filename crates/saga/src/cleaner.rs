//! Deletes outbox rows that no longer need to be kept.

use chrono::Utc;
use store::{PaymentStore, PaymentStoreExt};

use crate::config::{OutboxConfig, chrono_duration};
use crate::error::Result;
use crate::order_processing;

/// Removes published rows and rows that ran out of attempts once they are
/// older than the retention period.
pub struct OutboxCleaner<S>
where
    S: PaymentStore,
{
    store: S,
    config: OutboxConfig,
}

impl<S> OutboxCleaner<S>
where
    S: PaymentStore,
{
    pub fn new(store: S, config: OutboxConfig) -> Self {
        Self { store, config }
    }

    /// Runs one cleanup pass and returns how many rows were deleted.
    #[tracing::instrument(skip(self))]
    pub async fn clean(&self) -> Result<u64> {
        let older_than = Utc::now() - chrono_duration(self.config.retention);
        let deleted = self
            .store
            .purge_outbox(
                order_processing::SAGA_TYPE,
                older_than,
                self.config.max_attempts,
                self.config.batch_size,
            )
            .await?;

        if deleted > 0 {
            metrics::counter!("outbox_cleaned_total").increment(deleted);
            tracing::info!(deleted, "removed finished outbox messages");
        }
        Ok(deleted)
    }
}
