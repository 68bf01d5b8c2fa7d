//! Payment service entry point.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use payment_service::config::{Config, LogFormat};
use payment_service::error::ServiceError;
use payment_service::{PaymentService, create_app};
use saga::{InMemoryBroker, MessageBroker};
use store::{InMemoryPaymentStore, PaymentStore, PostgresPaymentStore};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[cfg(feature = "kafka")]
fn kafka_config(config: &Config, bootstrap_servers: &str) -> messaging::kafka::KafkaConfig {
    messaging::kafka::KafkaConfig {
        bootstrap_servers: bootstrap_servers.to_string(),
        group_id: config.kafka_group_id.clone(),
        request_topic: config.topics.request.clone(),
    }
}

#[cfg(feature = "kafka")]
fn create_broker(config: &Config) -> Result<Arc<dyn MessageBroker>, ServiceError> {
    match config.kafka_bootstrap_servers.as_deref() {
        Some(servers) => {
            tracing::info!(%servers, "connecting to kafka");
            let broker = messaging::kafka::KafkaBroker::new(&kafka_config(config, servers))?;
            Ok(Arc::new(broker))
        }
        None => {
            tracing::warn!("KAFKA_BOOTSTRAP_SERVERS not set, using in-process broker");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}

#[cfg(not(feature = "kafka"))]
fn create_broker(config: &Config) -> Result<Arc<dyn MessageBroker>, ServiceError> {
    if config.kafka_bootstrap_servers.is_some() {
        tracing::warn!("built without the kafka feature, ignoring KAFKA_BOOTSTRAP_SERVERS");
    }
    Ok(Arc::new(InMemoryBroker::new()))
}

#[cfg(feature = "kafka")]
fn spawn_request_consumer<S>(
    config: &Config,
    service: &PaymentService<S>,
    shutdown: watch::Receiver<bool>,
) -> Result<Option<JoinHandle<()>>, ServiceError>
where
    S: PaymentStore + Clone + 'static,
{
    let Some(servers) = config.kafka_bootstrap_servers.as_deref() else {
        return Ok(None);
    };
    let consumer = messaging::kafka::request_consumer(&kafka_config(config, servers))?;
    let listener = Arc::clone(&service.listener);
    Ok(Some(tokio::spawn(messaging::kafka::run_request_consumer(
        consumer, listener, shutdown,
    ))))
}

#[cfg(not(feature = "kafka"))]
fn spawn_request_consumer<S>(
    _config: &Config,
    _service: &PaymentService<S>,
    _shutdown: watch::Receiver<bool>,
) -> Result<Option<JoinHandle<()>>, ServiceError>
where
    S: PaymentStore + Clone + 'static,
{
    Ok(None)
}

async fn run<S>(
    store: S,
    config: Config,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> Result<(), ServiceError>
where
    S: PaymentStore + Clone + 'static,
{
    // 1. Wire the saga step
    let broker = create_broker(&config)?;
    let service = PaymentService::new(store, broker, &config);
    let scheduler = service.start_outbox();

    // 2. Start consuming payment requests
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = spawn_request_consumer(&config, &service, shutdown_rx)?;

    // 3. Serve health and metrics
    let addr = config.addr();
    tracing::info!(%addr, "starting payment service");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, create_app(metrics_handle))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 4. Drain background work
    let _ = shutdown_tx.send(true);
    if let Some(consumer) = consumer
        && let Err(err) = consumer.await
    {
        tracing::error!(error = %err, "request consumer task failed");
    }
    scheduler.shutdown().await;

    tracing::info!("payment service shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresPaymentStore::connect(&url).await?;
            store.run_migrations().await?;
            run(store, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            run(InMemoryPaymentStore::new(), config, metrics_handle).await
        }
    }
}
