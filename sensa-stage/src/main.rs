use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use clap::{Parser, ValueEnum};
use sensa_queue::{MemoryQueue, MqttOptions, MqttQueue, NatsOptions, NatsQueue, Queue};
use sensa_stage::config::{CacheConfig, QueueConfig, StoreConfig};
use sensa_stage::notify::{HttpNotifier, Notifier, RateLimitedNotifier, Spacing};
use sensa_stage::worker::{self, RunningStage};
use sensa_stage::{
    Accumulator, Alerter, Backends, Config, DecoderStage, Eventer, Ingestor, StageContext,
    StageMetrics, Validator, accumulator, alerter, decoder, eventer, ingestor, validator,
};
use sensa_store::{Cache, Fixtures, MemoryCache, MemoryStore, RedisCache, Seeder, SqliteStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sensa")]
#[command(about = "Sensa telemetry pipeline")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SENSA_CONFIG", default_value = "sensa.toml")]
    config: PathBuf,
    /// Stage to run in this process
    #[arg(value_enum)]
    stage: StageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageKind {
    Ingestor,
    Decoder,
    Validator,
    Accumulator,
    Eventer,
    Alerter,
    All,
}

impl StageKind {
    fn runs(self, stage: StageKind) -> bool {
        self == StageKind::All || self == stage
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "sensa=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    info!(
        stage = ?cli.stage,
        http_addr = %config.server.http_addr,
        "Starting sensa"
    );

    let queue = connect_queue(&config.queue).await?;
    let cache = connect_cache(&config.cache).await?;
    let backends = match &config.store {
        StoreConfig::Memory => {
            info!("Using in-memory store");
            let store = MemoryStore::new();
            seed(&config, &store).await?;
            Backends::from_store(store, cache)
        }
        StoreConfig::Sqlite { path } => {
            info!(path = ?path, "Using SQLite store");
            let store = SqliteStore::connect(path.to_string_lossy()).await?;
            seed(&config, &store).await?;
            Backends::from_store(store, cache)
        }
    };

    let metrics = StageMetrics::new();
    let mut sources: Vec<Arc<dyn Queue>> = Vec::new();
    let stages = start_stages(
        cli.stage,
        &config,
        queue.clone(),
        &backends,
        &metrics,
        &mut sources,
    )
    .await?;

    let cancel = CancellationToken::new();
    let http_addr = config.server.http_addr;
    let axum_app = Router::new().route("/health", get(health_handler));
    let axum_listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server listening");

    let cancel_for_http = cancel.clone();
    let http_handle = tokio::spawn(async move {
        let result = axum::serve(axum_listener, axum_app)
            .with_graceful_shutdown(async move {
                cancel_for_http.cancelled().await;
            })
            .await;
        if let Err(e) = result {
            error!(error = ?e, "HTTP server error");
        }
        info!("HTTP server shut down");
    });

    shutdown_signal().await;
    cancel.cancel();

    for stage in stages {
        info!(stage = stage.name(), "Stopping stage");
        stage.shutdown().await;
    }
    for source in sources {
        if let Err(e) = source.disconnect().await {
            warn!(error = %e, "source disconnect failed");
        }
    }
    if let Err(e) = queue.disconnect().await {
        warn!(error = %e, "queue disconnect failed");
    }
    let _ = http_handle.await;

    for (counter, value) in metrics.snapshot() {
        info!(%counter, value, "stage metric");
    }
    info!("sensa shut down complete");
    Ok(())
}

async fn connect_queue(config: &QueueConfig) -> color_eyre::Result<Arc<dyn Queue>> {
    let queue: Arc<dyn Queue> = match config {
        QueueConfig::Memory => {
            info!("Using in-memory queue");
            Arc::new(MemoryQueue::new())
        }
        QueueConfig::Nats { url, stream } => {
            info!(%url, %stream, "Connecting to NATS");
            Arc::new(
                NatsQueue::connect(&NatsOptions {
                    url: url.clone(),
                    stream: stream.clone(),
                    connect_timeout: Duration::from_secs(10),
                })
                .await?,
            )
        }
        QueueConfig::Mqtt {
            url,
            client_id,
            username,
            password,
        } => {
            info!(%url, %client_id, "Connecting to MQTT broker");
            Arc::new(MqttQueue::connect(&MqttOptions {
                url: url.clone(),
                client_id: client_id.clone(),
                username: username.clone(),
                password: password.clone(),
                keep_alive: Duration::from_secs(30),
            })?)
        }
    };
    Ok(queue)
}

async fn connect_cache(config: &CacheConfig) -> color_eyre::Result<Arc<dyn Cache>> {
    let cache: Arc<dyn Cache> = match config {
        CacheConfig::Memory => Arc::new(MemoryCache::new()),
        CacheConfig::Redis { url } => {
            info!(%url, "Connecting to Redis");
            let cache = RedisCache::new(url)?;
            cache.ping().await?;
            Arc::new(cache)
        }
    };
    Ok(cache)
}

async fn seed(config: &Config, store: &dyn Seeder) -> color_eyre::Result<()> {
    if let Some(path) = &config.fixtures {
        info!(path = ?path, "Seeding store from fixtures");
        Fixtures::load(path)?.seed(store).await?;
    }
    Ok(())
}

fn notifier(config: &Config, cache: Arc<dyn Cache>) -> color_eyre::Result<Arc<dyn Notifier>> {
    let provider = HttpNotifier::from_config(&config.notify)?;
    if !provider.is_configured() {
        warn!("No notification provider configured, notifications are logged only");
    }
    let spacing = Spacing {
        app: Duration::from_millis(config.notify.app_spacing_ms),
        sms: Duration::from_millis(config.notify.sms_spacing_ms),
        email: Duration::from_millis(config.notify.email_spacing_ms),
    };
    Ok(Arc::new(RateLimitedNotifier::new(
        provider,
        cache,
        spacing,
        config.op_timeout(),
    )))
}

async fn start_stages(
    kind: StageKind,
    config: &Config,
    queue: Arc<dyn Queue>,
    backends: &Backends,
    metrics: &StageMetrics,
    sources: &mut Vec<Arc<dyn Queue>>,
) -> color_eyre::Result<Vec<RunningStage>> {
    let topics = &config.topics;
    let workers = &config.workers;
    let ctx = |name| StageContext::new(name, metrics.clone(), config.op_timeout());
    let mut stages = Vec::new();

    // Consumers attach before producers so that nothing published at
    // startup is lost on brokers that drop messages without subscribers.
    if kind.runs(StageKind::Alerter) {
        let handler = Arc::new(Alerter::new(
            ctx(alerter::NAME),
            backends.alerter_stores(),
            backends.cache.clone(),
            notifier(config, backends.cache.clone())?,
        ));
        stages.push(
            worker::start(
                handler,
                queue.clone(),
                &topics.eventer_out,
                alerter::NAME,
                workers.alerter,
            )
            .await?,
        );
    }

    if kind.runs(StageKind::Accumulator) {
        let handler = Arc::new(Accumulator::new(
            ctx(accumulator::NAME),
            backends.points.clone(),
        ));
        stages.push(
            worker::start(
                handler,
                queue.clone(),
                &topics.validator_out,
                accumulator::NAME,
                workers.accumulator,
            )
            .await?,
        );
    }

    if kind.runs(StageKind::Eventer) {
        let handler = Arc::new(Eventer::new(
            ctx(eventer::NAME),
            queue.clone(),
            backends.rules.clone(),
            backends.events.clone(),
            &topics.eventer_out,
        ));
        worker::prime(queue.as_ref(), &[handler.output_topic()]).await?;
        stages.push(
            worker::start(
                handler,
                queue.clone(),
                &topics.validator_out,
                eventer::NAME,
                workers.eventer,
            )
            .await?,
        );
    }

    if kind.runs(StageKind::Validator) {
        let handler = Arc::new(Validator::new(
            ctx(validator::NAME),
            queue.clone(),
            backends.devices.clone(),
            &topics.validator_out,
        ));
        worker::prime(queue.as_ref(), &[handler.output_topic()]).await?;
        stages.push(
            worker::start(
                handler,
                queue.clone(),
                &topics.validator_in,
                validator::NAME,
                workers.validator,
            )
            .await?,
        );
    }

    if kind.runs(StageKind::Decoder) {
        let handler = Arc::new(DecoderStage::new(
            ctx(decoder::NAME),
            queue.clone(),
            backends.devices.clone(),
            &topics.validator_in,
        ));
        worker::prime(queue.as_ref(), &[handler.output_topic()]).await?;
        stages.push(
            worker::start(
                handler,
                queue.clone(),
                &topics.decoder_in,
                decoder::NAME,
                workers.decoder,
            )
            .await?,
        );
    }

    if kind.runs(StageKind::Ingestor) {
        let handler = Arc::new(Ingestor::new(ctx(ingestor::NAME), queue.clone(), topics));
        worker::prime(queue.as_ref(), &handler.output_topics()).await?;

        let source: Arc<dyn Queue> = match &config.ingestor.source {
            Some(source) => {
                info!(url = %source.url, "Connecting to device broker");
                let source: Arc<dyn Queue> = Arc::new(MqttQueue::connect(&MqttOptions {
                    url: source.url.clone(),
                    client_id: source.client_id.clone(),
                    username: source.username.clone(),
                    password: source.password.clone(),
                    keep_alive: Duration::from_secs(30),
                })?);
                sources.push(source.clone());
                source
            }
            None => queue.clone(),
        };
        for filter in &config.ingestor.topics {
            stages.push(
                worker::start(
                    handler.clone(),
                    source.clone(),
                    filter,
                    ingestor::NAME,
                    workers.ingestor,
                )
                .await?,
            );
        }
    }

    Ok(stages)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
                return;
            }
            Err(e) => error!(error = %e, "Error setting up SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Error waiting for Ctrl+C");
    }
    info!("Received Ctrl+C, shutting down...");
}

async fn health_handler() -> &'static str {
    "OK"
}
