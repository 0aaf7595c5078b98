//! Map native content placeholders to publication events, from Kafka and over HTTP.
use std::sync::Arc;

use envconfig::Envconfig;
use eyre::{Context, Result};
use placeholder_common::docstore::{build_http_client, DocStoreClient, HttpDocStoreClient};
use placeholder_common::mapper::{
    ComplementaryContentCphMapper, ContentCphMapper, CphMapper, DefaultAggregateMapper,
};
use placeholder_common::native::DefaultNativeMapper;
use placeholder_common::resolver::DocStoreIdentifierResolver;
use placeholder_common::validator::HeadlineValidator;
use time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use placeholder_mapper::api::{router, AppState};
use placeholder_mapper::config::{load_authority_mappings, Config};
use placeholder_mapper::handler::{self, QueueHandler};
use placeholder_mapper::health::{DocStoreCheck, LivenessRegistry};
use placeholder_mapper::kafka::{create_kafka_producer, KafkaMessageProducer, NativeRecordConsumer};
use placeholder_mapper::metrics::setup_metrics_recorder;

async fn shutdown(stop: watch::Sender<bool>) {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
    stop.send_replace(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::init_from_env().context("invalid configuration")?;

    let mappings = load_authority_mappings(&config.authority_mappings_path)?;
    info!("loaded {} authority mappings", mappings.len());

    let http_client = build_http_client(&config.http_client_settings())
        .context("failed to build http client")?;
    let doc_store = HttpDocStoreClient::new(http_client, &config.document_store_api_address);
    let doc_store_client: Arc<dyn DocStoreClient> = Arc::new(doc_store.clone());

    let mappers: Vec<Arc<dyn CphMapper>> = vec![
        Arc::new(ContentCphMapper),
        Arc::new(ComplementaryContentCphMapper::new(
            &config.api_host,
            doc_store_client.clone(),
        )),
    ];
    let aggregate_mapper = Arc::new(
        DefaultAggregateMapper::new(
            Arc::new(DocStoreIdentifierResolver::new(doc_store_client, mappings)),
            Arc::new(HeadlineValidator),
            mappers,
        )
        .with_blog_categories(config.blog_categories.0.clone()),
    );
    let native_mapper = Arc::new(DefaultNativeMapper);

    let liveness = LivenessRegistry::new();
    let producer = create_kafka_producer(
        &config.kafka,
        liveness.register("kafka_producer", Duration::seconds(30)),
    )
    .await
    .context("failed to create kafka producer")?;
    let consumer = NativeRecordConsumer::new(
        &config.kafka,
        liveness.register("kafka_consumer", Duration::seconds(30)),
    )
    .context("failed to create kafka consumer")?;

    let queue_handler = QueueHandler::new(
        native_mapper.clone(),
        aggregate_mapper.clone(),
        Arc::new(KafkaMessageProducer::new(
            producer,
            &config.kafka.kafka_producer_topic,
        )),
    );

    let recorder_handle = if config.export_prometheus {
        Some(setup_metrics_recorder().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let app = router(
        AppState {
            native_mapper,
            aggregate_mapper,
            checks: vec![Arc::new(DocStoreCheck::new(doc_store))],
            liveness,
        },
        recorder_handle,
    );

    let (stop, stopped) = watch::channel(false);
    let consumer_loop = tokio::spawn(handler::run(consumer, queue_handler, stopped.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind())
        .await
        .with_context(|| format!("failed to bind {}", config.bind()))?;
    info!("listening on {}", config.bind());

    let mut server_stopped = stopped;
    tokio::spawn(shutdown(stop));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            server_stopped.wait_for(|stop| *stop).await.ok();
        })
        .await
        .context("http server failed")?;

    consumer_loop.await.context("queue consumer panicked")?;

    Ok(())
}
