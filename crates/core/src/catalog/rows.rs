use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw catalog rows as the shop staff maintain them. List-valued cells are
/// comma separated strings, the same way they appear in a spreadsheet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRows {
    pub products: Vec<ProductRow>,
    pub promotions: Vec<PromotionRow>,
    pub faqs: Vec<FaqRow>,
    pub payment_methods: Vec<PaymentMethodRow>,
    pub persona: Option<PersonaRow>,
    pub settings: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductRow {
    pub code: String,
    pub name: String,
    pub category: String,
    pub price: i64,
    pub aliases: String,
    pub variants: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: String,
    pub threshold: Option<u32>,
    pub get_free: Option<u32>,
    pub min_quantity: Option<u32>,
    pub min_amount: Option<u64>,
    pub percent: Option<Decimal>,
    pub amount: Option<u64>,
    pub product_codes: String,
    pub categories: String,
    pub combinable: bool,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaqRow {
    pub id: String,
    pub question: String,
    /// `keyword_any:kw1,kw2`, a bare keyword list, or `always:*` for the catch-all answer.
    pub rule: String,
    pub answer: String,
    pub priority: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentMethodRow {
    pub method: String,
    pub detail: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaRow {
    pub name: String,
    pub personality: String,
}

impl CatalogRows {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Stable fingerprint of the rows; identical rows always hash the same.
    pub fn revision(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let hash = blake3::hash(&canonical);
        hash.to_hex().as_str()[..16].to_owned()
    }
}
