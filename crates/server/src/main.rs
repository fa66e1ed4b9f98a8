mod bootstrap;
mod health;
mod tasks;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use chatcart_core::config::{AppConfig, LoadOptions};

use crate::tasks::{CatalogRefreshTask, SessionEvictionTask};

fn init_logging(config: &AppConfig) {
    use chatcart_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let (stop, shutdown) = watch::channel(false);
    let refresh = CatalogRefreshTask {
        catalog: Arc::clone(app.runtime.catalog()),
        source: Arc::clone(&app.catalog_source),
        audit: Arc::clone(&app.audit),
        every: Duration::from_secs(app.config.catalog.refresh_secs),
        timeout: Duration::from_millis(app.config.conversation.external_call_timeout_ms),
    }
    .spawn(shutdown.clone());
    let eviction = SessionEvictionTask {
        sessions: Arc::clone(app.runtime.sessions()),
        idle_timeout: Duration::from_secs(app.config.conversation.session_idle_timeout_secs),
    }
    .spawn(shutdown);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        customer_id = "-",
        bind_address = %address,
        "chatcart-server listening"
    );
    axum::serve(listener, webhook::router(app.state()))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        customer_id = "-",
        "chatcart-server stopping"
    );
    let _ = stop.send(true);
    let _ = refresh.await;
    let _ = eviction.await;

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let bootstrap::Application { db_pool, audit_writer, runtime, audit, .. } = app;
    drop(runtime);
    drop(audit);
    if tokio::time::timeout(grace, audit_writer).await.is_err() {
        tracing::warn!(
            event_name = "system.server.audit_flush_timed_out",
            correlation_id = "shutdown",
            customer_id = "-",
            "audit queue was not drained before the shutdown deadline"
        );
    }
    db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            customer_id = "-",
            error = %error,
            "could not listen for ctrl-c; shutting down"
        );
    }
}
