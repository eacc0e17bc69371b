//! sme-indexer worker entry point.
//!
//! Wires the configured backends, starts the health server and runs the
//! worker loop until Ctrl-C (or until the message bound is reached).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use sqlx::PgPool;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sme_indexer::api;
use sme_indexer::app_state::AppState;
use sme_indexer::chain::{ChainClient, SolanaRpcClient};
use sme_indexer::config::{Backend, WorkerConfig};
use sme_indexer::indexer::{AssetIndexRoutine, CollectionScanRoutine, TransactionBatchRoutine};
use sme_indexer::notify::{ErrorNotifier, LogNotifier, WebhookNotifier};
use sme_indexer::parser::ParserRegistry;
use sme_indexer::persistence::{self, PostgresDedupeStore, PostgresQueue, PostgresStream};
use sme_indexer::queue::{MemoryQueue, QueueClient, QueueRouter};
use sme_indexer::routine::RoutineRegistry;
use sme_indexer::stream::{
    DedupePublishStage, DedupeStore, MemoryStream, RecentIdentityCache, StreamPublisher,
    StreamSink,
};
use sme_indexer::worker::WorkerRuntime;

const RETENTION_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;
    init_tracing(config.log_json);
    tracing::info!(addr = %config.listen_addr, "starting sme-indexer");

    let pool = if config.needs_database() {
        let pool = persistence::connect(&config).await?;
        persistence::ensure_schema(&pool).await?;
        Some(pool)
    } else {
        None
    };

    // Collaborators
    let chain: Arc<dyn ChainClient> = Arc::new(SolanaRpcClient::new(
        config.rpc_url.clone(),
        Duration::from_secs(config.rpc_timeout_secs),
    )?);
    let queue: Arc<dyn QueueClient> = match config.queue_backend {
        Backend::Memory => Arc::new(MemoryQueue::new()),
        Backend::Postgres => Arc::new(PostgresQueue::new(require(pool.as_ref())?)),
    };
    let sink: Arc<dyn StreamSink> = match config.stream_backend {
        Backend::Memory => Arc::new(MemoryStream::new()),
        Backend::Postgres => Arc::new(PostgresStream::new(require(pool.as_ref())?)),
    };
    let postgres_dedupe = match config.dedupe_backend {
        Backend::Memory => None,
        Backend::Postgres => Some(Arc::new(PostgresDedupeStore::new(require(pool.as_ref())?))),
    };
    let dedupe: Arc<dyn DedupeStore> = match &postgres_dedupe {
        Some(store) => Arc::clone(store) as Arc<dyn DedupeStore>,
        None => Arc::new(RecentIdentityCache::new(config.dedupe_cache_capacity)),
    };
    let notifier: Arc<dyn ErrorNotifier> = match &config.alert_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), Duration::from_secs(5))?),
        None => Arc::new(LogNotifier),
    };

    // Routing
    let bindings = config.bindings()?;
    let mut router = QueueRouter::new(bindings.clone(), Arc::clone(&queue));
    let mut override_pool = None;
    if let Some(endpoint) = &config.queue_endpoint_override {
        match config.queue_backend {
            Backend::Postgres => {
                let endpoint_pool = persistence::connect_to(&config, endpoint).await?;
                persistence::ensure_schema(&endpoint_pool).await?;
                router = router.with_endpoint_client(
                    endpoint.clone(),
                    Arc::new(PostgresQueue::new(endpoint_pool.clone())),
                );
                override_pool = Some(endpoint_pool);
            }
            Backend::Memory => {
                tracing::warn!("QUEUE_ENDPOINT_OVERRIDE ignored by the memory queue backend");
            }
        }
    }
    for binding in bindings.all() {
        let served_by = router
            .endpoint_serving(&binding.queue_url)
            .map_or("default", |_| "endpoint override");
        tracing::info!(
            routine_type = %binding.routine_type,
            queue = %binding.queue_url,
            backend = ?config.queue_backend,
            served_by,
            "queue binding"
        );
    }

    // Routines
    let publisher = StreamPublisher::new(
        sink,
        config.stream_name.clone(),
        config.publish_batch_size,
        config.publish_retry(),
    );
    let stage = DedupePublishStage::new(dedupe, publisher);
    let scan = CollectionScanRoutine::new(Arc::clone(&chain), router.clone())
        .with_follow_up(config.collection_follow_up_routine.clone());
    scan.ensure_follow_up_bound()?;
    let mut routines = RoutineRegistry::new();
    routines.register(
        TransactionBatchRoutine::new(
            Arc::clone(&chain),
            ParserRegistry::with_all(),
            stage,
            Arc::clone(&notifier),
        )
        .with_fetch_concurrency(config.fetch_concurrency),
    )?;
    routines.register(scan)?;
    routines.register(
        AssetIndexRoutine::new(Arc::clone(&chain), router.clone())
            .with_fetch_concurrency(config.fetch_concurrency),
    )?;
    let routines = Arc::new(routines);
    tracing::info!(routines = ?routines.routine_types(), bindings = bindings.len(), "routines registered");

    let settings = config.worker_settings(&bindings)?;
    let worker = WorkerRuntime::new(router, Arc::clone(&routines), notifier, settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Health server
    let app_state = AppState {
        stats: worker.stats(),
        bindings,
        routines,
    };
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    if let Some(store) = postgres_dedupe
        && config.dedupe_retention_days > 0
    {
        tokio::spawn(retention_loop(
            store,
            config.dedupe_retention_days,
            shutdown_rx.clone(),
        ));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        let _ = shutdown_tx.send(true);
    });

    let result = worker.run(shutdown_rx).await;
    let snapshot = worker.stats().snapshot();
    tracing::info!(?snapshot, "worker stopped");
    server.abort();
    for pool in [pool, override_pool].into_iter().flatten() {
        pool.close().await;
    }
    result?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn require(pool: Option<&PgPool>) -> anyhow::Result<PgPool> {
    pool.cloned()
        .context("postgres backend selected without a database pool")
}

async fn retention_loop(
    store: Arc<PostgresDedupeStore>,
    days: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(RETENTION_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.delete_older_than(days).await {
                    Ok(deleted) => tracing::info!(deleted, days, "pruned dedupe identities"),
                    Err(e) => tracing::warn!(error = %e, "dedupe retention cleanup failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
