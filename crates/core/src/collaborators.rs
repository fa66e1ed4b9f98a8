use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::Persona;
use crate::domain::order::{OrderId, OrderRecord};
use crate::domain::session::CustomerId;
use crate::errors::ApplicationError;
use crate::flows::ToneRequest;

#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn append(&self, order: &OrderRecord) -> Result<(), ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StaffMessage {
    OrderPlaced { order_id: OrderId, customer_id: CustomerId, summary: String },
    InternalError { customer_id: CustomerId, correlation_id: String, detail: String },
}

impl StaffMessage {
    pub fn text(&self) -> String {
        match self {
            Self::OrderPlaced { summary, .. } => summary.clone(),
            Self::InternalError { customer_id, correlation_id, detail } => format!(
                "⚠️ บอทตอบลูกค้า {customer_id} ไม่ได้ (ref {correlation_id})\n{detail}"
            ),
        }
    }
}

#[async_trait]
pub trait StaffNotifier: Send + Sync {
    async fn notify(&self, message: StaffMessage) -> Result<(), ApplicationError>;
}

/// Rephrases a reply in the shop persona's voice. Callers bound every call
/// with a timeout and fall back to `request.fallback`.
#[async_trait]
pub trait ToneGenerator: Send + Sync {
    async fn rephrase(
        &self,
        persona: &Persona,
        request: &ToneRequest,
    ) -> Result<String, ApplicationError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderSink {
    orders: Mutex<Vec<OrderRecord>>,
}

impl InMemoryOrderSink {
    pub fn orders(&self) -> Vec<OrderRecord> {
        match self.orders.lock() {
            Ok(orders) => orders.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl OrderSink for InMemoryOrderSink {
    async fn append(&self, order: &OrderRecord) -> Result<(), ApplicationError> {
        match self.orders.lock() {
            Ok(mut orders) => orders.push(order.clone()),
            Err(poisoned) => poisoned.into_inner().push(order.clone()),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStaffNotifier {
    messages: Mutex<Vec<StaffMessage>>,
}

impl InMemoryStaffNotifier {
    pub fn messages(&self) -> Vec<StaffMessage> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl StaffNotifier for InMemoryStaffNotifier {
    async fn notify(&self, message: StaffMessage) -> Result<(), ApplicationError> {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}

/// Returns the fallback text unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiteralToneGenerator;

#[async_trait]
impl ToneGenerator for LiteralToneGenerator {
    async fn rephrase(
        &self,
        _persona: &Persona,
        request: &ToneRequest,
    ) -> Result<String, ApplicationError> {
        Ok(request.fallback.clone())
    }
}
