use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductCode;
use crate::text::normalize_key;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PromotionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromotionKind {
    /// Every `threshold` matching units earn `free_per_threshold` free units.
    QuantityThresholdFreeItem { threshold: u32, free_per_threshold: u32 },
    /// Percent of the matching amount, in the 0..=100 range.
    PercentageDiscount { percent: Decimal },
    FixedAmountDiscount { amount: u64 },
    /// Discount equal to the shop's shipping fee.
    FreeShipping,
}

impl PromotionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::QuantityThresholdFreeItem { .. } => "quantity_threshold_free_item",
            Self::PercentageDiscount { .. } => "percentage_discount",
            Self::FixedAmountDiscount { .. } => "fixed_amount_discount",
            Self::FreeShipping => "free_shipping",
        }
    }
}

/// Eligibility thresholds evaluated against the matching lines only. Zero means "no minimum".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionCondition {
    pub min_quantity: u32,
    pub min_amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Applicability {
    All,
    /// Normalized product codes and categories; a line matches when either set contains it.
    Only { product_codes: BTreeSet<String>, categories: BTreeSet<String> },
}

impl Applicability {
    /// Builds the filter from raw cells. A `*` in either cell, or two empty cells, means "all".
    pub fn from_cells(product_codes: &[String], categories: &[String]) -> Self {
        let wildcard = product_codes.iter().chain(categories).any(|value| value.trim() == "*");
        if wildcard || (product_codes.is_empty() && categories.is_empty()) {
            return Self::All;
        }

        Self::Only {
            product_codes: product_codes.iter().map(|code| normalize_key(code)).collect(),
            categories: categories.iter().map(|category| normalize_key(category)).collect(),
        }
    }

    pub fn matches(&self, product_code: &ProductCode, category: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only { product_codes, categories } => {
                product_codes.contains(&normalize_key(&product_code.0))
                    || categories.contains(&normalize_key(category))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub title: String,
    pub description: String,
    pub kind: PromotionKind,
    pub condition: PromotionCondition,
    pub applies_to: Applicability,
    pub combinable: bool,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
}

impl Promotion {
    /// Validity window check; both bounds are inclusive.
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        let started = self.starts_on.map(|start| day >= start).unwrap_or(true);
        let not_ended = self.ends_on.map(|end| day <= end).unwrap_or(true);
        started && not_ended
    }

    /// "title — description", falling back to whichever half is present.
    pub fn one_line(&self) -> String {
        let title = self.title.trim();
        let description = self.description.trim();
        match (title.is_empty(), description.is_empty()) {
            (false, false) => format!("{title} — {description}"),
            (false, true) => title.to_string(),
            (true, false) => description.to_string(),
            (true, true) => self.id.0.clone(),
        }
    }
}
