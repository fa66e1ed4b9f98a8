use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use chatcart_core::collaborators::OrderSink;
use chatcart_core::domain::order::{OrderId, OrderLine, OrderRecord, OrderStatus};
use chatcart_core::domain::product::ProductCode;
use chatcart_core::domain::session::CustomerId;
use chatcart_core::errors::ApplicationError;

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, order_id: &str) -> Result<Vec<OrderLine>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT product_code, name, variant, quantity, unit_price, line_total
            FROM order_lines
            WHERE order_id = ?
            ORDER BY line_no
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(line_from_row).collect()
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<OrderRecord, RepositoryError> {
        let id: String = row.try_get("id")?;
        let lines = self.load_lines(&id).await?;
        let status: String = row.try_get("status")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(OrderRecord {
            id: OrderId(id),
            customer_id: CustomerId(row.try_get("customer_id")?),
            lines,
            subtotal: to_amount(row.try_get("subtotal")?)?,
            discount: to_amount(row.try_get("discount")?)?,
            promotion_description: row.try_get("promotion_description")?,
            total: to_amount(row.try_get("total")?)?,
            address: row.try_get("address")?,
            phone: row.try_get("phone")?,
            status: OrderStatus::parse(&status)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status}`")))?,
            catalog_revision: row.try_get("catalog_revision")?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn save(&self, order: &OrderRecord) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, subtotal, discount, promotion_description, total,
                address, phone, status, catalog_revision, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&order.id.0)
        .bind(&order.customer_id.0)
        .bind(from_amount(order.subtotal)?)
        .bind(from_amount(order.discount)?)
        .bind(&order.promotion_description)
        .bind(from_amount(order.total)?)
        .bind(&order.address)
        .bind(&order.phone)
        .bind(order.status.as_str())
        .bind(&order.catalog_revision)
        .bind(order.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(RepositoryError::DuplicateOrder(order.id.clone()));
        }

        for (line_no, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    order_id, line_no, product_code, name, variant, quantity, unit_price, line_total
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&order.id.0)
            .bind(line_no as i64)
            .bind(&line.product_code.0)
            .bind(&line.name)
            .bind(&line.variant)
            .bind(i64::from(line.quantity))
            .bind(from_amount(line.unit_price)?)
            .bind(from_amount(line.line_total)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE customer_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(&customer_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderSink for SqlOrderRepository {
    async fn append(&self, order: &OrderRecord) -> Result<(), ApplicationError> {
        self.save(order).await.map_err(ApplicationError::from)
    }
}

fn line_from_row(row: &SqliteRow) -> Result<OrderLine, RepositoryError> {
    let quantity: i64 = row.try_get("quantity")?;
    Ok(OrderLine {
        product_code: ProductCode(row.try_get("product_code")?),
        name: row.try_get("name")?,
        variant: row.try_get("variant")?,
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("invalid quantity {quantity}")))?,
        unit_price: to_amount(row.try_get("unit_price")?)?,
        line_total: to_amount(row.try_get("line_total")?)?,
    })
}

fn to_amount(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::Decode(format!("negative amount {value}")))
}

fn from_amount(value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| RepositoryError::Decode(format!("amount {value} overflows")))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}
