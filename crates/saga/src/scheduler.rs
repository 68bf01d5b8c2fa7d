//! Periodic background tasks for the outbox.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use store::PaymentStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cleaner::OutboxCleaner;
use crate::publisher::OutboxPublisher;

/// Handle to the running publisher and cleaner tasks.
///
/// Dropping the handle leaves the tasks running; call
/// [`OutboxScheduler::shutdown`] to stop them.
pub struct OutboxScheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl OutboxScheduler {
    /// Spawns the publish and cleanup loops on the current runtime.
    pub fn start<S>(
        publisher: Arc<OutboxPublisher<S>>,
        cleaner: Arc<OutboxCleaner<S>>,
        poll_interval: Duration,
        cleanup_interval: Duration,
    ) -> Self
    where
        S: PaymentStore + 'static,
    {
        let (shutdown, signal) = watch::channel(false);

        let publish_task = spawn_periodic("outbox-publisher", poll_interval, signal.clone(), {
            move || {
                let publisher = Arc::clone(&publisher);
                async move {
                    if let Err(err) = publisher.publish_pending().await {
                        tracing::error!(error = %err, "outbox publish sweep failed");
                    }
                }
            }
        });

        let cleanup_task = spawn_periodic("outbox-cleaner", cleanup_interval, signal, {
            move || {
                let cleaner = Arc::clone(&cleaner);
                async move {
                    if let Err(err) = cleaner.clean().await {
                        tracing::error!(error = %err, "outbox cleanup failed");
                    }
                }
            }
        });

        Self {
            shutdown,
            tasks: vec![publish_task, cleanup_task],
        }
    }

    /// Stops the loops after their current iteration and waits for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "outbox task panicked");
            }
        }
        tracing::info!("outbox scheduler stopped");
    }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(task = name, ?period, "background task started");

        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
