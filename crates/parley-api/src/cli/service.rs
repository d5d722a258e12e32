//! Long-running commands: the queue consumer, the HTTP read API, and the
//! one-shot migration.

use std::sync::Arc;

use anyhow::Context;
use parley_core::ingest::consumer::{ConsumerStats, QueueConsumer};
use parley_infra::amqp::AmqpSource;
use parley_types::config::ServiceConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::http;
use crate::state::AppState;

/// Consumer plus HTTP API. Either one stopping stops the other.
pub async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let state = AppState::init(config).await?;

    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let consumer = tokio::spawn({
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move {
            let result = run_consumer(&state, shutdown.clone()).await;
            // A failed consumer takes the HTTP server down with it.
            shutdown.cancel();
            result
        }
    });

    println!(
        "  {} Parley read API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state.clone());
    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await;

    // Make sure the consumer stops even if the server failed on its own.
    shutdown.cancel();
    let consumed = consumer.await.context("consumer task panicked")?;
    state.db_pool.close().await;

    served.context("HTTP server failed")?;
    consumed?;
    println!("\n  Parley stopped.");
    Ok(())
}

/// Consumer only.
pub async fn consume(config: ServiceConfig) -> anyhow::Result<()> {
    let state = AppState::init(config).await?;
    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let result = run_consumer(&state, shutdown).await;
    state.db_pool.close().await;
    result.map(|_| ())
}

/// Open the database, which applies pending migrations, then exit.
pub async fn migrate(config: ServiceConfig) -> anyhow::Result<()> {
    let state = AppState::init(config).await?;
    state.db_pool.close().await;

    println!(
        "  {} Database schema is up to date ({})",
        console::style("✓").green(),
        console::style(&state.config.database.url).dim()
    );
    Ok(())
}

/// Subscribe to the configured queue and consume until `shutdown` fires.
///
/// Returns an error on broker failure or sustained storage failure so the
/// process exits non-zero and its supervisor restarts it.
async fn run_consumer(
    state: &AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<ConsumerStats> {
    let amqp = &state.config.amqp;
    let mut source = AmqpSource::connect(amqp)
        .await
        .with_context(|| format!("failed to subscribe to queue '{}'", amqp.queue))?;

    let consumer = QueueConsumer::new(
        Arc::clone(&state.pipeline),
        state.config.ingest.max_consecutive_failures,
    );
    let result = consumer.run(&mut source, shutdown).await;

    if let Err(e) = source.close().await {
        warn!(error = %e, "Broker connection did not close cleanly");
    }

    let stats = result.context("queue consumer stopped")?;
    info!(
        acked = stats.acked,
        rejected = stats.rejected,
        requeued = stats.requeued,
        "Queue consumer stopped"
    );
    Ok(stats)
}

/// Cancel `token` on Ctrl+C or SIGTERM.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        token.cancel();
    });
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
