mod config;
mod handler;
mod ingress;
mod metrics;
mod shutdown;
mod telemetry;
mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;

use store::{exact_string_schema, DgraphClient, GraphStore};

use crate::config::AppConfig;
use crate::ingress::IngressState;
use crate::metrics::Metrics;
use crate::shutdown::Signals;
use crate::worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;
    telemetry::init(&config.log);

    // Connect to Dgraph
    let store: Arc<dyn GraphStore> = Arc::new(
        DgraphClient::new(&config.dgraph_url, config.request_timeout())
            .context("Failed to build Dgraph client")?,
    );

    // Indexed identifying predicates
    let schema = exact_string_schema(&config.schema.indexed_predicates);
    store
        .alter_schema(&schema)
        .await
        .context("Failed to apply graph schema")?;

    let signals = Signals::register().context("Failed to register signal handlers")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(signals.forward(shutdown_tx));

    // Worker pool
    let metrics = Metrics::new();
    let (sender, receiver) = mpsc::channel(config.concurrency.queue_depth);
    let worker = Worker::new(
        store.clone(),
        metrics.clone(),
        config.concurrency.max_in_flight,
    );
    let worker_handle = tokio::spawn(worker.run(receiver, shutdown_rx.clone()));

    // Build router
    let app = ingress::router(&config.topic, IngressState::new(sender, store, metrics))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    tracing::info!(
        addr = %config.listen_addr,
        topic = %config.topic,
        dgraph = %config.dgraph_url,
        "Listening on {}",
        config.topic
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::triggered(shutdown_rx))
        .await
        .context("Ingress server failed")?;

    worker_handle.await.context("Worker task failed")?;
    tracing::info!("Shutdown complete");
    Ok(())
}
