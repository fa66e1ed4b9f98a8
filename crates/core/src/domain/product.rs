use serde::{Deserialize, Serialize};

use crate::text::normalize_key;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductCode(pub String);

impl std::fmt::Display for ProductCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: ProductCode,
    pub name: String,
    pub category: String,
    /// Whole currency units.
    pub unit_price: u64,
    pub aliases: Vec<String>,
    pub variants: Vec<String>,
}

impl Product {
    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    /// Finds the variant label contained in `text`. When several labels match,
    /// the longest one wins so "เผ็ดมาก" is not shadowed by a plain "เผ็ด".
    pub fn match_variant(&self, text: &str) -> Option<&str> {
        let normalized_text = normalize_key(text);
        self.variants
            .iter()
            .filter(|variant| {
                let key = normalize_key(variant);
                !key.is_empty() && normalized_text.contains(&key)
            })
            .max_by_key(|variant| normalize_key(variant).chars().count())
            .map(String::as_str)
    }
}
