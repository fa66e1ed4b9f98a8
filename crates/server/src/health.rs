use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;

use chatcart_db::DbPool;

use crate::webhook::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub catalog: HealthCheck,
    pub database: HealthCheck,
    pub sessions: usize,
    pub checked_at: String,
}

pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let catalog = catalog_check(&state);
    let database = database_check(&state.db_pool).await;
    let ready = catalog.status == "ready" && database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        catalog,
        database,
        sessions: state.runtime.sessions().len().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn catalog_check(state: &AppState) -> HealthCheck {
    let view = state.runtime.catalog().current();
    if view.snapshot().is_empty() {
        return HealthCheck { status: "degraded", detail: "catalog has no products loaded".to_owned() };
    }
    HealthCheck {
        status: "ready",
        detail: format!(
            "revision {} with {} products",
            view.revision(),
            view.snapshot().products.len()
        ),
    }
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_owned() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use chrono::Utc;
    use chatcart_core::catalog::{CatalogStore, CatalogView};
    use chatcart_line::InMemoryReplySender;

    use crate::health::healthz;
    use crate::webhook::tests::{demo_catalog, pool, state};

    #[tokio::test]
    async fn healthz_is_ready_with_catalog_and_database() {
        let db_pool = pool().await;

        let (status, Json(payload)) =
            healthz(State(state(demo_catalog(), db_pool.clone(), InMemoryReplySender::default())))
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert!(payload.catalog.detail.contains("3 products"));
        db_pool.close().await;
    }

    #[tokio::test]
    async fn healthz_is_degraded_before_the_catalog_loads() {
        let empty = CatalogStore::new(CatalogView::empty(Utc::now()).expect("empty view"));

        let (status, Json(payload)) =
            healthz(State(state(empty, pool().await, InMemoryReplySender::default()))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.catalog.status, "degraded");
        assert_eq!(payload.database.status, "ready");
    }

    #[tokio::test]
    async fn healthz_is_degraded_when_the_database_is_closed() {
        let db_pool = pool().await;
        db_pool.close().await;

        let (status, Json(payload)) =
            healthz(State(state(demo_catalog(), db_pool, InMemoryReplySender::default()))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.catalog.status, "ready");
    }
}
