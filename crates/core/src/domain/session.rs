use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cart::Cart;
use crate::domain::product::Product;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    PickingVariant,
    PickingQuantity,
    Confirming,
    CollectingDeliveryInfo,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PickingVariant => "picking_variant",
            Self::PickingQuantity => "picking_quantity",
            Self::Confirming => "confirming",
            Self::CollectingDeliveryInfo => "collecting_delivery_info",
        }
    }
}

/// Item under selection. The product is a snapshot so a catalog refresh mid-selection
/// does not change what the customer is choosing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItem {
    pub product: Product,
    pub variant: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub customer_id: CustomerId,
    pub stage: Stage,
    pub pending: Option<PendingItem>,
    pub cart: Cart,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(customer_id: CustomerId, now: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            stage: Stage::Idle,
            pending: None,
            cart: Cart::default(),
            address: None,
            phone: None,
            last_activity: now,
        }
    }

    /// Back to the initial stage with an empty cart; only the customer id survives.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(self.customer_id.clone(), now);
    }

    pub fn has_delivery_info(&self) -> bool {
        self.address.is_some() && self.phone.is_some()
    }
}
