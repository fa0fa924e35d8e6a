//! Rampart settlement server.
//!
//! Runs the HTTP API and the outbound delivery worker pool in one process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rampart_api::{AppState, create_router};
use rampart_db::repositories::QueueDefaults;
use rampart_db::{DeliveryQueue, IdempotencyRepository, connect_with_pool, migration::Migrator};
use rampart_shared::AppConfig;
use rampart_worker::{WebhookSender, WorkerPool, WorkerSettings};

const IDEMPOTENCY_PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(config.logging.json);

    let db = connect_with_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .context("Failed to connect to database")?;
    info!("Connected to database");

    Migrator::up(&db, None)
        .await
        .context("Failed to run migrations")?;

    let queue = DeliveryQueue::new(
        db.clone(),
        QueueDefaults {
            secret: config.delivery.secret.clone(),
            default_url: config.delivery.default_url.clone(),
            max_attempts: config.delivery.max_attempts,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sender = WebhookSender::new(config.delivery.request_timeout())
        .context("Failed to build delivery HTTP client")?;
    let settings = WorkerSettings::from_config(&config.delivery);
    info!(
        concurrency = settings.concurrency,
        max_attempts = config.delivery.max_attempts,
        "Starting delivery workers"
    );
    let pool = Arc::new(WorkerPool::new(Arc::new(queue.clone()), sender, settings));
    let workers = tokio::spawn(pool.run(shutdown_rx.clone()));

    let idempotency = IdempotencyRepository::new(
        db.clone(),
        Duration::from_secs(config.idempotency.ttl_secs),
    );
    let purger = tokio::spawn(purge_idempotency_keys(idempotency, shutdown_rx));

    let state = AppState::new(db, &config, queue);
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // In-flight deliveries finish before the workers exit.
    let _ = shutdown_tx.send(true);
    if let Err(e) = workers.await {
        warn!(error = %e, "Worker pool task failed");
    }
    if let Err(e) = purger.await {
        warn!(error = %e, "Idempotency purge task failed");
    }
    info!("Shutdown complete");

    served.context("Server error")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,rampart=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn purge_idempotency_keys(repo: IdempotencyRepository, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(IDEMPOTENCY_PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => match repo.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Purged expired idempotency keys"),
                Err(e) => warn!(error = %e, "Failed to purge idempotency keys"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
