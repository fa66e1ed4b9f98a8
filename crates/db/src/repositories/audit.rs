use std::collections::BTreeMap;

use sqlx::Row;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use chatcart_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use chatcart_core::domain::session::CustomerId;

use super::order::parse_timestamp;
use super::RepositoryError;
use crate::DbPool;

/// Persists audit events to `audit_events` from a background writer task.
/// `emit` never blocks the conversation path; write failures are logged.
#[derive(Clone)]
pub struct SqlAuditSink {
    sender: mpsc::UnboundedSender<AuditEvent>,
}

impl SqlAuditSink {
    /// Must be called inside a tokio runtime. The writer drains remaining
    /// events and exits once every clone of the sink is dropped.
    pub fn spawn(pool: DbPool) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AuditEvent>();
        let writer = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(error) = insert_event(&pool, &event).await {
                    warn!(
                        event_name = "persistence.audit.write_failed",
                        correlation_id = %event.correlation_id,
                        audit_event_type = %event.event_type,
                        error = %error,
                        "failed to persist audit event"
                    );
                }
            }
        });
        (Self { sender }, writer)
    }
}

impl AuditSink for SqlAuditSink {
    fn emit(&self, event: AuditEvent) {
        if self.sender.send(event).is_err() {
            warn!(event_name = "persistence.audit.writer_closed", "audit writer has stopped");
        }
    }
}

async fn insert_event(pool: &DbPool, event: &AuditEvent) -> Result<(), RepositoryError> {
    let metadata = serde_json::to_string(&event.metadata)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO audit_events (
            id, customer_id, correlation_id, event_type, category, actor, outcome,
            metadata_json, occurred_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.event_id)
    .bind(event.customer_id.as_ref().map(|id| id.0.as_str()))
    .bind(&event.correlation_id)
    .bind(&event.event_type)
    .bind(event.category.as_str())
    .bind(&event.actor)
    .bind(event.outcome.as_str())
    .bind(metadata)
    .bind(event.occurred_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Oldest first.
pub async fn load_audit_events(
    pool: &DbPool,
    customer_id: &CustomerId,
) -> Result<Vec<AuditEvent>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT id, customer_id, correlation_id, event_type, category, actor, outcome,
               metadata_json, occurred_at
        FROM audit_events
        WHERE customer_id = ?
        ORDER BY occurred_at, rowid
        "#,
    )
    .bind(&customer_id.0)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let category: String = row.try_get("category")?;
            let outcome: String = row.try_get("outcome")?;
            let metadata_json: String = row.try_get("metadata_json")?;
            let occurred_at: String = row.try_get("occurred_at")?;
            let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;

            Ok(AuditEvent {
                event_id: row.try_get("id")?,
                customer_id: row.try_get::<Option<String>, _>("customer_id")?.map(CustomerId),
                correlation_id: row.try_get("correlation_id")?,
                event_type: row.try_get("event_type")?,
                category: AuditCategory::parse(&category).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown audit category `{category}`"))
                })?,
                actor: row.try_get("actor")?,
                outcome: AuditOutcome::parse(&outcome).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown audit outcome `{outcome}`"))
                })?,
                metadata,
                occurred_at: parse_timestamp(&occurred_at)?,
            })
        })
        .collect()
}
