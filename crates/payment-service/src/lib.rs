//! Payment service: the payment step of the order-processing saga.
//!
//! Wires the saga coordinator, outbox publisher and cleaner, and the request
//! listener around a payment store and message broker, and exposes health and
//! Prometheus metrics over HTTP.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use messaging::PaymentRequestListener;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    MessageBroker, OutboxCleaner, OutboxConfig, OutboxPublisher, OutboxScheduler,
    PaymentSagaCoordinator, ResponseDispatcher,
};
use store::PaymentStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Creates the Axum router serving `/health` and `/metrics`.
pub fn create_app(metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The payment step's components, sharing one store and broker.
pub struct PaymentService<S>
where
    S: PaymentStore,
{
    pub coordinator: Arc<PaymentSagaCoordinator<S>>,
    pub publisher: Arc<OutboxPublisher<S>>,
    pub cleaner: Arc<OutboxCleaner<S>>,
    pub listener: Arc<PaymentRequestListener<S>>,
    outbox: OutboxConfig,
}

impl<S> PaymentService<S>
where
    S: PaymentStore + Clone + 'static,
{
    pub fn new(store: S, broker: Arc<dyn MessageBroker>, config: &Config) -> Self {
        let outbox = config.outbox.clone();

        let dispatcher = ResponseDispatcher::new(
            Arc::clone(&broker),
            config.topics.response.clone(),
            outbox.ack_timeout,
        );
        let coordinator = Arc::new(PaymentSagaCoordinator::new(store.clone(), dispatcher));
        let publisher = Arc::new(OutboxPublisher::new(
            store.clone(),
            Arc::clone(&broker),
            outbox.clone(),
            config.topics.response.clone(),
        ));
        let cleaner = Arc::new(OutboxCleaner::new(store, outbox.clone()));
        let listener = Arc::new(PaymentRequestListener::new(
            Arc::clone(&coordinator),
            broker,
            config.topics.dead_letter.clone(),
            outbox.ack_timeout,
        ));

        Self {
            coordinator,
            publisher,
            cleaner,
            listener,
            outbox,
        }
    }

    /// Starts the periodic publish and cleanup tasks.
    pub fn start_outbox(&self) -> OutboxScheduler {
        tracing::info!(
            poll_interval_ms = self.outbox.poll_interval.as_millis() as u64,
            cleanup_interval_secs = self.outbox.cleanup_interval.as_secs(),
            "starting outbox scheduler"
        );
        OutboxScheduler::start(
            Arc::clone(&self.publisher),
            Arc::clone(&self.cleaner),
            self.outbox.poll_interval,
            self.outbox.cleanup_interval,
        )
    }
}
