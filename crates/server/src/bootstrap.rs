use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use chatcart_agent::{
    refresh_catalog, tone_generator_from_config, Collaborators, ConversationRuntime,
    RuntimeSettings,
};
use chatcart_core::audit::{AuditSink, FanoutAuditSink, TracingAuditSink};
use chatcart_core::catalog::{CatalogSource, CatalogStore, CatalogView, FileCatalogSource};
use chatcart_core::config::{AppConfig, ConfigError, LoadOptions};
use chatcart_core::errors::{ApplicationError, DomainError};
use chatcart_core::flows::ConversationEngine;
use chatcart_core::orders::{OrderFinalizer, UuidOrderIds};
use chatcart_core::pricing::DeterministicPricingEngine;
use chatcart_core::sessions::{InMemorySessionStore, SessionStore};
use chatcart_db::{connect_from_config, migrations, DbPool, SqlAuditSink, SqlOrderRepository};
use chatcart_line::{LineClient, LineError, LinePushNotifier, ReplySender};

use crate::webhook::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<ConversationRuntime>,
    pub catalog_source: Arc<dyn CatalogSource>,
    pub replies: Arc<dyn ReplySender>,
    pub audit: Arc<dyn AuditSink>,
    /// Finishes once every audit sender is dropped and the queue is flushed.
    pub audit_writer: JoinHandle<()>,
}

impl Application {
    pub fn state(&self) -> AppState {
        AppState {
            runtime: Arc::clone(&self.runtime),
            replies: Arc::clone(&self.replies),
            channel_secret: self.config.line.channel_secret.clone(),
            db_pool: self.db_pool.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("initial catalog load failed: {0}")]
    Catalog(#[source] ApplicationError),
    #[error("tone generator setup failed: {0}")]
    Tone(#[source] ApplicationError),
    #[error("LINE client setup failed: {0}")]
    Line(#[source] LineError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        customer_id = "-",
        "starting application bootstrap"
    );
    config.require_line_credentials()?;

    let db_pool = connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        customer_id = "-",
        database_url = %config.database.url,
        "order ledger connected and migrated"
    );

    let (sql_audit, audit_writer) = SqlAuditSink::spawn(db_pool.clone());
    let audit: Arc<dyn AuditSink> =
        Arc::new(FanoutAuditSink::new(vec![Arc::new(TracingAuditSink), Arc::new(sql_audit)]));

    let external_timeout = Duration::from_millis(config.conversation.external_call_timeout_ms);
    let catalog_source: Arc<dyn CatalogSource> = Arc::new(FileCatalogSource::new(&config.catalog.path));
    let empty = CatalogView::empty(Utc::now())
        .map_err(|error| BootstrapError::Catalog(DomainError::from(error).into()))?;
    let catalog = Arc::new(CatalogStore::new(empty));
    refresh_catalog(&catalog, catalog_source.as_ref(), audit.as_ref(), external_timeout)
        .await
        .map_err(BootstrapError::Catalog)?;

    let line_client = LineClient::new(
        config.line.api_base_url.clone(),
        config.line.access_token.clone(),
        external_timeout,
    )
    .map_err(BootstrapError::Line)?;
    let replies: Arc<dyn ReplySender> = Arc::new(line_client);

    let collaborators = Collaborators {
        orders: Arc::new(SqlOrderRepository::new(db_pool.clone())),
        notifier: Arc::new(LinePushNotifier::new(
            Arc::clone(&replies),
            config.line.staff_target.clone(),
        )),
        tone: tone_generator_from_config(&config.llm).map_err(BootstrapError::Tone)?,
        audit: Arc::clone(&audit),
    };
    let engine = ConversationEngine::new(
        DeterministicPricingEngine,
        OrderFinalizer::new(Arc::new(UuidOrderIds)),
        config.conversation_settings(),
    );
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::default());
    let runtime = ConversationRuntime::new(
        engine,
        catalog,
        sessions,
        collaborators,
        RuntimeSettings::from_config(&config),
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        customer_id = "-",
        catalog_revision = %runtime.catalog().current().revision(),
        llm_provider = config.llm.provider.as_str(),
        "application bootstrap complete"
    );

    Ok(Application {
        config,
        db_pool,
        runtime: Arc::new(runtime),
        catalog_source,
        replies,
        audit,
        audit_writer,
    })
}
