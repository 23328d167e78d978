use std::sync::Arc;

use actix_web::{
    middleware::{NormalizePath, TrailingSlash},
    web::Data,
    App, HttpServer,
};
use api::AdminState;
use car::Car;
use config::{Config, SinkKind};
use metrics::OutboxMetrics;
use processor::{OutboxProcessor, ProcessorConfig};
use sink::{memory::InMemorySink, opensearch::OpenSearchSink, SearchSink};
use store::SqliteOutboxStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};
use url::Url;

pub mod api;
pub mod car;
pub mod config;
pub mod dedup;
pub mod error;
pub mod message;
pub mod metrics;
pub mod processor;
pub mod sink;
pub mod store;

/// Returns a builder for the relay: the outbox processor loop plus the admin
/// HTTP server. Without an explicit config, settings are read from the
/// environment.
#[bon::builder(finish_fn = start)]
pub async fn run(config: Option<Config>) -> eyre::Result<()> {
    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("OUTBOX_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("OUTBOX_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    let config = match config {
        Some(config) => config,
        None => Config::load()?,
    };

    let store = SqliteOutboxStore::connect_with(&config).await?;
    let metrics = Arc::new(OutboxMetrics::new());
    let shutdown = CancellationToken::new();

    let worker = match config.sink() {
        SinkKind::OpenSearch => {
            let sink = OpenSearchSink::<Car>::builder()
                .base_url(Url::parse(config.opensearch_url())?)
                .index(config.opensearch_index())
                .maybe_username(config.opensearch_username.clone())
                .maybe_password(config.opensearch_password.clone())
                .timeout(config.opensearch_timeout())
                .build()?;

            spawn_processor(
                store.clone(),
                sink,
                config.processor_config(),
                metrics.clone(),
                shutdown.clone(),
            )
        }
        SinkKind::Memory => {
            tracing::warn!("Using the in-memory sink; nothing leaves this process");

            spawn_processor(
                store.clone(),
                InMemorySink::<Car>::new(),
                config.processor_config(),
                metrics.clone(),
                shutdown.clone(),
            )
        }
    };

    let data = Data::new(AdminState {
        store,
        metrics,
        failed_scan_limit: config.failed_scan_limit(),
    });

    tracing::info!(addr = %config.admin_addr(), "Starting admin server");

    // Returns once a termination signal has stopped the server.
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .service(api::service())
            .app_data(data.clone())
    })
    .bind(config.admin_addr())?
    .run()
    .await?;

    shutdown.cancel();
    worker.await?;

    Ok(())
}

fn spawn_processor<K: SearchSink>(
    store: SqliteOutboxStore,
    sink: K,
    config: ProcessorConfig,
    metrics: Arc<OutboxMetrics>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let processor = OutboxProcessor::new(store, sink, config).with_metrics(metrics);

    tokio::spawn(async move { processor.run(shutdown).await })
}
