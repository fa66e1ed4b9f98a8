use async_trait::async_trait;
use tokio::sync::RwLock;

use chatcart_core::collaborators::OrderSink;
use chatcart_core::domain::order::{OrderId, OrderRecord};
use chatcart_core::domain::session::CustomerId;
use chatcart_core::errors::ApplicationError;

use super::{OrderRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<OrderRecord>>,
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &OrderRecord) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|existing| existing.id == order.id) {
            return Err(RepositoryError::DuplicateOrder(order.id.clone()));
        }
        orders.push(order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|order| &order.id == id).cloned())
    }

    async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<OrderRecord> =
            orders.iter().filter(|order| &order.customer_id == customer_id).cloned().collect();
        matching.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| right.id.0.cmp(&left.id.0))
        });
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

#[async_trait]
impl OrderSink for InMemoryOrderRepository {
    async fn append(&self, order: &OrderRecord) -> Result<(), ApplicationError> {
        self.save(order).await.map_err(ApplicationError::from)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use chatcart_core::domain::order::{OrderId, OrderRecord, OrderStatus};
    use chatcart_core::domain::session::CustomerId;

    use super::InMemoryOrderRepository;
    use crate::repositories::{OrderRepository, RepositoryError};

    fn order(id: &str, customer: &str) -> OrderRecord {
        OrderRecord {
            id: OrderId(id.to_owned()),
            customer_id: CustomerId(customer.to_owned()),
            lines: Vec::new(),
            subtotal: 120,
            discount: 0,
            promotion_description: None,
            total: 120,
            address: "12 หมู่ 3 ตำบลบ้านใหม่ เชียงใหม่ 50000".to_owned(),
            phone: "0891112222".to_owned(),
            status: OrderStatus::Received,
            catalog_revision: "rev".to_owned(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn history_is_scoped_to_the_customer() {
        let repo = InMemoryOrderRepository::default();
        repo.save(&order("ORD-1", "U1")).await.expect("save");
        repo.save(&order("ORD-2", "U2")).await.expect("save");

        let history = repo.list_for_customer(&CustomerId("U1".to_owned()), 10).await.expect("list");

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id.0, "ORD-1");
        assert!(matches!(
            repo.save(&order("ORD-1", "U1")).await,
            Err(RepositoryError::DuplicateOrder(_))
        ));
    }
}
