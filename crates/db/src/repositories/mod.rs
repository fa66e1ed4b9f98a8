use async_trait::async_trait;
use thiserror::Error;

use chatcart_core::domain::order::{OrderId, OrderRecord};
use chatcart_core::domain::session::CustomerId;
use chatcart_core::errors::ApplicationError;

pub mod audit;
pub mod memory;
pub mod order;

pub use audit::{load_audit_events, SqlAuditSink};
pub use memory::InMemoryOrderRepository;
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("order `{0}` already exists")]
    DuplicateOrder(OrderId),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Append-only order ledger.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save(&self, order: &OrderRecord) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError>;
    /// Newest first.
    async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<OrderRecord>, RepositoryError>;
}
