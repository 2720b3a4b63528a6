//! RFQ dispatch worker.
//!
//! Loads configuration, wires storage and transports, re-enqueues attempts
//! left `queued` by a previous run and drains the dispatch queue until
//! SIGTERM or Ctrl+C.

use anyhow::Context;
use clap::Parser;
use rfq_dispatch::application::services::{
    DispatchPool, DispatchQueue, DispatchWorker, RfqDispatcher, TimelineLog,
};
use rfq_dispatch::config::AppConfig;
use rfq_dispatch::infrastructure::persistence::in_memory::{
    InMemoryRfqRepository, InMemorySendAttemptRepository, InMemoryTimelineEventStore,
};
use rfq_dispatch::infrastructure::persistence::postgres::{
    self, PostgresRfqRepository, PostgresSendAttemptRepository, PostgresTimelineEventStore,
};
use rfq_dispatch::infrastructure::persistence::{
    RfqRepository, SendAttemptRepository, TimelineEventStore,
};
use rfq_dispatch::infrastructure::transport::TransportRouter;
use rfq_dispatch::logging::init_tracing;
use rfq_dispatch::shutdown::install_signal_handler;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// RFQ dispatch worker.
#[derive(Parser, Debug)]
#[command(name = "rfq-dispatch-worker", version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `dispatch.worker_count`.
    #[arg(long)]
    workers: Option<usize>,
}

type Stores = (
    Arc<dyn RfqRepository>,
    Arc<dyn SendAttemptRepository>,
    Arc<dyn TimelineEventStore>,
);

async fn stores(config: &AppConfig) -> anyhow::Result<Stores> {
    if config.database.url.is_none() {
        warn!("database.url not set, using in-memory storage");
        return Ok((
            Arc::new(InMemoryRfqRepository::new()),
            Arc::new(InMemorySendAttemptRepository::new()),
            Arc::new(InMemoryTimelineEventStore::new()),
        ));
    }

    let pool = postgres::connect(&config.database)
        .await
        .context("connecting to postgres")?;
    if config.database.run_migrations {
        postgres::run_migrations(&pool)
            .await
            .context("running migrations")?;
    }
    Ok((
        Arc::new(PostgresRfqRepository::new(pool.clone())),
        Arc::new(PostgresSendAttemptRepository::new(pool.clone())),
        Arc::new(PostgresTimelineEventStore::new(pool)),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(workers) = cli.workers {
        config.dispatch = config.dispatch.with_worker_count(workers);
    }
    init_tracing(&config.log);

    let (rfqs, attempts, events) = stores(&config).await?;
    let timeline = TimelineLog::new(events, Arc::new(config.timeline.clone()));
    let transport = TransportRouter::from_config(&config.transport).context("building transports")?;

    let (queue, receiver) = DispatchQueue::bounded(config.dispatch.queue_capacity);
    let dispatcher = Arc::new(
        RfqDispatcher::new(rfqs, attempts, timeline, config.dispatch.clone())
            .with_queue(queue.clone()),
    );
    let worker = Arc::new(DispatchWorker::new(dispatcher, Arc::new(transport)));

    let shutdown = install_signal_handler();
    let pool = DispatchPool::spawn(
        worker,
        queue,
        receiver,
        config.dispatch.worker_count,
        shutdown.clone(),
    );
    let recovered = pool
        .recover(config.dispatch.recovery_batch)
        .await
        .context("recovering queued attempts")?;
    info!(recovered, workers = config.dispatch.worker_count, "rfq dispatch worker running");

    shutdown.cancelled().await;
    pool.shutdown().await;
    Ok(())
}
