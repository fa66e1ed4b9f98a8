use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use chatcart_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use chatcart_core::catalog::{CatalogSource, CatalogStore, RefreshOutcome};
use chatcart_core::errors::ApplicationError;
use chatcart_core::sessions::SessionStore;

/// One catalog refresh pass. On failure or timeout the current view stays live.
pub async fn refresh_catalog(
    store: &CatalogStore,
    source: &dyn CatalogSource,
    audit: &dyn AuditSink,
    wait: Duration,
) -> Result<RefreshOutcome, ApplicationError> {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let result = match timeout(wait, store.refresh(source)).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(catalog_error)) => Err(ApplicationError::from(
            chatcart_core::errors::DomainError::from(catalog_error),
        )),
        Err(_) => Err(ApplicationError::Timeout {
            operation: format!("catalog refresh from {}", source.describe()),
            timeout_ms: wait.as_millis() as u64,
        }),
    };

    let event = |outcome: AuditOutcome| {
        AuditEvent::new(
            None,
            correlation_id.clone(),
            "catalog.refreshed",
            AuditCategory::Catalog,
            "scheduler",
            outcome,
        )
        .with_metadata("source", source.describe())
    };

    match &result {
        Ok(RefreshOutcome::Replaced { previous_revision, revision, products }) => {
            info!(
                event_name = "catalog.refresh.replaced",
                correlation_id = %correlation_id,
                previous_revision = %previous_revision,
                revision = %revision,
                products = *products,
                "catalog snapshot replaced"
            );
            audit.emit(
                event(AuditOutcome::Success)
                    .with_metadata("revision", revision.clone())
                    .with_metadata("previous_revision", previous_revision.clone()),
            );
        }
        Ok(RefreshOutcome::Unchanged { revision }) => {
            debug!(
                event_name = "catalog.refresh.unchanged",
                correlation_id = %correlation_id,
                revision = %revision,
                "catalog unchanged"
            );
        }
        Err(refresh_error) => {
            warn!(
                event_name = "catalog.refresh.failed",
                correlation_id = %correlation_id,
                error = %refresh_error,
                kept_revision = %store.current().revision(),
                "catalog refresh failed; keeping current snapshot"
            );
            audit.emit(event(AuditOutcome::Failed).with_metadata("error", refresh_error.to_string()));
        }
    }
    result
}

pub async fn evict_idle_sessions(sessions: &dyn SessionStore, idle_timeout: chrono::Duration) -> usize {
    let evicted = sessions.evict_idle(Utc::now(), idle_timeout).await;
    if evicted > 0 {
        let remaining = sessions.len().await;
        info!(
            event_name = "sessions.evicted",
            evicted,
            remaining,
            "idle sessions evicted"
        );
    }
    evicted
}
