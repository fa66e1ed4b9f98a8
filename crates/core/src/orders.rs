use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::order::{OrderId, OrderLine, OrderRecord, OrderStatus};
use crate::domain::session::Session;
use crate::pricing::PromotionResult;

pub trait OrderIdGenerator: Send + Sync {
    fn next_id(&self, now: DateTime<Utc>) -> OrderId;
}

/// `ORD-YYYYMMDD-XXXXXXXX` with a random suffix.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidOrderIds;

impl OrderIdGenerator for UuidOrderIds {
    fn next_id(&self, now: DateTime<Utc>) -> OrderId {
        let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        OrderId(format!("ORD-{}-{suffix}", now.format("%Y%m%d")))
    }
}

/// Predictable ids for tests and the local chat command.
#[derive(Debug, Default)]
pub struct SequentialOrderIds {
    next: AtomicU64,
}

impl OrderIdGenerator for SequentialOrderIds {
    fn next_id(&self, now: DateTime<Utc>) -> OrderId {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        OrderId(format!("ORD-{}-{sequence:04}", now.format("%Y%m%d")))
    }
}

#[derive(Clone)]
pub struct OrderFinalizer {
    ids: Arc<dyn OrderIdGenerator>,
}

impl OrderFinalizer {
    pub fn new(ids: Arc<dyn OrderIdGenerator>) -> Self {
        Self { ids }
    }

    /// Snapshots the session's cart and delivery details into an order. The
    /// caller guarantees a non-empty cart with address and phone present.
    pub fn finalize(
        &self,
        session: &Session,
        pricing: &PromotionResult,
        catalog_revision: &str,
        now: DateTime<Utc>,
    ) -> OrderRecord {
        let lines = session
            .cart
            .items()
            .iter()
            .map(|item| OrderLine {
                product_code: item.product_code.clone(),
                name: item.name.clone(),
                variant: item.variant.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total(),
            })
            .collect();

        OrderRecord {
            id: self.ids.next_id(now),
            customer_id: session.customer_id.clone(),
            lines,
            subtotal: pricing.subtotal,
            discount: pricing.total_discount,
            promotion_description: pricing.summary(),
            total: pricing.total,
            address: session.address.clone().unwrap_or_default(),
            phone: session.phone.clone().unwrap_or_default(),
            status: OrderStatus::Received,
            catalog_revision: catalog_revision.to_owned(),
            created_at: now,
        }
    }
}

impl Default for OrderFinalizer {
    fn default() -> Self {
        Self::new(Arc::new(UuidOrderIds))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::{OrderFinalizer, OrderIdGenerator, SequentialOrderIds, UuidOrderIds};
    use crate::domain::cart::CartItem;
    use crate::domain::order::OrderStatus;
    use crate::domain::product::ProductCode;
    use crate::domain::promotion::PromotionId;
    use crate::domain::session::{CustomerId, Session};
    use crate::pricing::{AppliedPromotion, PromotionResult};

    #[test]
    fn uuid_ids_carry_the_order_date() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 9, 30, 0).single().expect("valid time");
        let id = UuidOrderIds.next_id(now);

        assert!(id.0.starts_with("ORD-20261014-"));
        assert_eq!(id.0.len(), "ORD-20261014-".len() + 8);
        assert_ne!(id, UuidOrderIds.next_id(now));
    }

    #[test]
    fn finalize_snapshots_lines_and_totals() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 9, 30, 0).single().expect("valid time");
        let mut session = Session::new(CustomerId("U1".to_owned()), now);
        session.cart.add(CartItem {
            product_code: ProductCode("NP01".to_owned()),
            name: "น้ำพริกเห็ด".to_owned(),
            category: "น้ำพริก".to_owned(),
            variant: Some("เผ็ดมาก".to_owned()),
            unit_price: 60,
            quantity: 5,
        });
        session.address = Some("99/1 ซอยสุขุมวิท 11 กรุงเทพ 10110".to_owned());
        session.phone = Some("0812345678".to_owned());
        let pricing = PromotionResult {
            subtotal: 300,
            total_discount: 60,
            applied: vec![AppliedPromotion {
                id: PromotionId("P1".to_owned()),
                description: "ซื้อ 5 แถม 1".to_owned(),
                discount: 60,
            }],
            total: 240,
        };

        let finalizer = OrderFinalizer::new(Arc::new(SequentialOrderIds::default()));
        let order = finalizer.finalize(&session, &pricing, "rev-1", now);

        assert_eq!(order.id.0, "ORD-20261014-0001");
        assert_eq!(order.lines[0].line_total, 300);
        assert_eq!(order.lines[0].variant.as_deref(), Some("เผ็ดมาก"));
        assert_eq!(order.total, 240);
        assert_eq!(order.promotion_description.as_deref(), Some("ซื้อ 5 แถม 1"));
        assert_eq!(order.status, OrderStatus::Received);
        assert_eq!(order.catalog_revision, "rev-1");
    }
}
