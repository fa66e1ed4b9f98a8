pub mod alias;
pub mod rows;
pub mod source;
pub mod store;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::product::{Product, ProductCode};
use crate::domain::promotion::{
    Applicability, Promotion, PromotionCondition, PromotionId, PromotionKind,
};
use crate::text::{normalize_key, split_list};

use self::rows::{CatalogRows, FaqRow, PromotionRow};

pub use self::alias::{AliasIndex, Resolution};
pub use self::source::{CatalogSource, FileCatalogSource, StaticCatalogSource};
pub use self::store::{CatalogStore, CatalogView, RefreshOutcome};

pub const DEFAULT_FAQ_PRIORITY: u32 = 999;

const DEFAULT_FALLBACK_MESSAGE: &str =
    "ขออภัยค่ะ ตอนนี้หนูยังไม่มีข้อมูลนี้ในระบบ เดี๋ยวแอดมินช่วยตรวจสอบให้นะคะ 🙏";
const DEFAULT_APOLOGY_MESSAGE: &str =
    "ขออภัยค่ะ ระบบขัดข้องชั่วคราว เดี๋ยวหนูจะส่งต่อให้แอดมินช่วยดูนะคะ 🙏";
const DEFAULT_GREETING: &str = "สวัสดีค่ะ ยินดีต้อนรับค่ะ สนใจสินค้าตัวไหนพิมพ์ชื่อมาได้เลยนะคะ";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("product row {row} has no code")]
    MissingProductCode { row: usize },
    #[error("duplicate product code `{0}`")]
    DuplicateProductCode(String),
    #[error("product `{code}` has negative price {price}")]
    NegativePrice { code: String, price: i64 },
    #[error("promotion `{id}` is invalid: {reason}")]
    InvalidPromotion { id: String, reason: String },
    #[error("faq `{id}` is invalid: {reason}")]
    InvalidFaqRule { id: String, reason: String },
    #[error("intent pattern failed to compile: {0}")]
    InvalidPattern(String),
    #[error("catalog source `{location}` could not be read: {message}")]
    Source { location: String, message: String },
    #[error("catalog source `{location}` could not be parsed: {message}")]
    Parse { location: String, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub id: String,
    pub question: String,
    /// Normalized trigger keywords; any one of them matching selects the entry.
    pub keywords: Vec<String>,
    pub priority: u32,
    pub answer_template: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub method: String,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub personality: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self { name: "แอดมิน".to_owned(), personality: "สุภาพ เป็นกันเอง ตอบสั้น".to_owned() }
    }
}

/// Key/value shop settings. Keys are trimmed and lowercased on load.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopSettings {
    entries: BTreeMap<String, String>,
}

impl ShopSettings {
    pub fn from_rows(rows: &BTreeMap<String, String>) -> Self {
        let entries = rows
            .iter()
            .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_owned()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str).filter(|value| !value.is_empty())
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn fallback_message(&self) -> &str {
        self.get("fallback_message").unwrap_or(DEFAULT_FALLBACK_MESSAGE)
    }

    pub fn apology_message(&self) -> &str {
        self.get("apology_message").unwrap_or(DEFAULT_APOLOGY_MESSAGE)
    }

    pub fn greeting(&self) -> &str {
        self.get("greeting").unwrap_or(DEFAULT_GREETING)
    }

    pub fn shop_name(&self) -> Option<&str> {
        self.get("shop_name")
    }

    /// Unparseable values count as zero.
    pub fn shipping_fee(&self) -> u64 {
        self.get("shipping_fee")
            .and_then(|value| crate::text::ascii_digits(value).parse::<u64>().ok())
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub revision: String,
    pub products: Vec<Product>,
    pub promotions: Vec<Promotion>,
    /// Sorted by priority, then by row order.
    pub faqs: Vec<FaqEntry>,
    /// Highest-priority `always:*` row; answers free text nothing else matched.
    #[serde(default)]
    pub fallback_faq: Option<FaqEntry>,
    pub payment_methods: Vec<PaymentMethod>,
    pub persona: Persona,
    pub settings: ShopSettings,
    pub loaded_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    pub fn empty(loaded_at: DateTime<Utc>) -> Self {
        Self {
            revision: "empty".to_owned(),
            products: Vec::new(),
            promotions: Vec::new(),
            faqs: Vec::new(),
            fallback_faq: None,
            payment_methods: Vec::new(),
            persona: Persona::default(),
            settings: ShopSettings::default(),
            loaded_at,
        }
    }

    /// Validates and converts raw rows. Any invalid row rejects the whole snapshot.
    pub fn from_rows(rows: &CatalogRows, loaded_at: DateTime<Utc>) -> Result<Self, CatalogError> {
        let mut seen_codes = HashSet::new();
        let mut products = Vec::with_capacity(rows.products.len());
        for (index, row) in rows.products.iter().enumerate() {
            let code = row.code.trim();
            if code.is_empty() {
                return Err(CatalogError::MissingProductCode { row: index + 1 });
            }
            if !seen_codes.insert(normalize_key(code)) {
                return Err(CatalogError::DuplicateProductCode(code.to_owned()));
            }
            let unit_price = u64::try_from(row.price)
                .map_err(|_| CatalogError::NegativePrice { code: code.to_owned(), price: row.price })?;
            let name = row.name.trim();
            products.push(Product {
                code: ProductCode(code.to_owned()),
                name: if name.is_empty() { code.to_owned() } else { name.to_owned() },
                category: row.category.trim().to_owned(),
                unit_price,
                aliases: split_list(&row.aliases),
                variants: split_list(&row.variants),
            });
        }

        let promotions =
            rows.promotions.iter().map(parse_promotion).collect::<Result<Vec<_>, _>>()?;

        let mut faqs = Vec::new();
        let mut fallbacks = Vec::new();
        for (index, row) in rows.faqs.iter().enumerate() {
            match parse_faq(index, row)? {
                ParsedFaq::Keyword(entry) => faqs.push(entry),
                ParsedFaq::Always(entry) => fallbacks.push(entry),
            }
        }
        faqs.sort_by_key(|faq| faq.priority);
        fallbacks.sort_by_key(|faq| faq.priority);

        let payment_methods = rows
            .payment_methods
            .iter()
            .filter(|row| !row.method.trim().is_empty())
            .map(|row| PaymentMethod {
                method: row.method.trim().to_owned(),
                detail: row.detail.trim().to_owned(),
            })
            .collect();

        let persona = rows
            .persona
            .as_ref()
            .filter(|row| !row.name.trim().is_empty())
            .map(|row| Persona {
                name: row.name.trim().to_owned(),
                personality: row.personality.trim().to_owned(),
            })
            .unwrap_or_default();

        Ok(Self {
            revision: rows.revision(),
            products,
            promotions,
            faqs,
            fallback_faq: fallbacks.into_iter().next(),
            payment_methods,
            persona,
            settings: ShopSettings::from_rows(&rows.settings),
            loaded_at,
        })
    }

    pub fn product(&self, code: &ProductCode) -> Option<&Product> {
        let key = normalize_key(&code.0);
        self.products.iter().find(|product| normalize_key(&product.code.0) == key)
    }

    pub fn active_promotions(&self, today: NaiveDate) -> Vec<&Promotion> {
        self.promotions.iter().filter(|promotion| promotion.is_active_on(today)).collect()
    }

    /// Distinct non-empty categories in catalog order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.products
            .iter()
            .map(|product| product.category.clone())
            .filter(|category| !category.is_empty() && seen.insert(normalize_key(category)))
            .collect()
    }

    pub fn products_in_category(&self, category: &str) -> Vec<&Product> {
        let key = normalize_key(category);
        self.products.iter().filter(|product| normalize_key(&product.category) == key).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

fn parse_promotion(row: &PromotionRow) -> Result<Promotion, CatalogError> {
    let id = row.id.trim().to_owned();
    let invalid = |reason: &str| CatalogError::InvalidPromotion {
        id: if id.is_empty() { row.title.clone() } else { id.clone() },
        reason: reason.to_owned(),
    };
    if id.is_empty() {
        return Err(invalid("missing id"));
    }

    let kind = match normalize_key(&row.kind).as_str() {
        "free_item" | "buy_x_get_y" | "quantity_threshold_free_item" => {
            let threshold = row.threshold.filter(|value| *value > 0).ok_or_else(|| {
                invalid("quantity threshold must be a positive integer")
            })?;
            let free_per_threshold = row.get_free.unwrap_or(1);
            if free_per_threshold == 0 {
                return Err(invalid("get_free must be positive"));
            }
            PromotionKind::QuantityThresholdFreeItem { threshold, free_per_threshold }
        }
        "percent" | "percentage" | "percentage_discount" => {
            let percent = row.percent.ok_or_else(|| invalid("percent is required"))?;
            if percent.is_sign_negative() || percent > rust_decimal::Decimal::ONE_HUNDRED {
                return Err(invalid("percent must be between 0 and 100"));
            }
            PromotionKind::PercentageDiscount { percent }
        }
        "fixed" | "fixed_amount" | "fixed_amount_discount" => {
            let amount = row.amount.ok_or_else(|| invalid("amount is required"))?;
            PromotionKind::FixedAmountDiscount { amount }
        }
        "free_shipping" | "freeshipping" => PromotionKind::FreeShipping,
        _ => return Err(invalid(&format!("unknown kind `{}`", row.kind))),
    };

    if let (Some(start), Some(end)) = (row.starts_on, row.ends_on) {
        if start > end {
            return Err(invalid("starts_on is after ends_on"));
        }
    }

    Ok(Promotion {
        id: PromotionId(id.clone()),
        title: row.title.trim().to_owned(),
        description: row.description.trim().to_owned(),
        kind,
        condition: PromotionCondition {
            min_quantity: row.min_quantity.unwrap_or(0),
            min_amount: row.min_amount.unwrap_or(0),
        },
        applies_to: Applicability::from_cells(
            &split_list(&row.product_codes),
            &split_list(&row.categories),
        ),
        combinable: row.combinable,
        starts_on: row.starts_on,
        ends_on: row.ends_on,
    })
}

enum ParsedFaq {
    Keyword(FaqEntry),
    Always(FaqEntry),
}

fn parse_faq(index: usize, row: &FaqRow) -> Result<ParsedFaq, CatalogError> {
    let id = if row.id.trim().is_empty() { format!("faq-{}", index + 1) } else { row.id.trim().to_owned() };
    if row.answer.trim().is_empty() {
        return Err(CatalogError::InvalidFaqRule { id, reason: "empty answer".to_owned() });
    }
    let rule = row.rule.split('|').next().unwrap_or_default().trim();
    let kind = rule.split(':').next().unwrap_or_default().trim();
    if kind.eq_ignore_ascii_case("always") {
        return Ok(ParsedFaq::Always(FaqEntry {
            id,
            question: row.question.trim().to_owned(),
            keywords: Vec::new(),
            priority: row.priority.unwrap_or(DEFAULT_FAQ_PRIORITY),
            answer_template: row.answer.trim().to_owned(),
        }));
    }

    let keyword_cell = match rule.split_once(':') {
        Some((kind, rest)) if kind.trim().eq_ignore_ascii_case("keyword_any") => rest,
        Some((kind, _)) => {
            return Err(CatalogError::InvalidFaqRule {
                id,
                reason: format!("unsupported rule kind `{}`", kind.trim()),
            })
        }
        None => rule,
    };

    let keywords: Vec<String> = split_list(keyword_cell)
        .iter()
        .map(|keyword| normalize_key(keyword))
        .filter(|keyword| !keyword.is_empty())
        .collect();
    if keywords.is_empty() {
        return Err(CatalogError::InvalidFaqRule { id, reason: "no keywords".to_owned() });
    }

    Ok(ParsedFaq::Keyword(FaqEntry {
        id,
        question: row.question.trim().to_owned(),
        keywords,
        priority: row.priority.unwrap_or(DEFAULT_FAQ_PRIORITY),
        answer_template: row.answer.trim().to_owned(),
    }))
}


#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::fixtures::{product_row, shop_rows};
    use super::rows::{FaqRow, PromotionRow};
    use super::{CatalogError, CatalogSnapshot, DEFAULT_FAQ_PRIORITY};
    use crate::domain::promotion::PromotionKind;

    #[test]
    fn rows_convert_into_a_snapshot() {
        let snapshot = CatalogSnapshot::from_rows(&shop_rows(), Utc::now()).expect("valid catalog");

        assert_eq!(snapshot.products.len(), 3);
        assert_eq!(snapshot.products[0].variants, vec!["เผ็ดน้อย", "เผ็ดมาก"]);
        assert_eq!(snapshot.categories(), vec!["น้ำพริก".to_owned(), "ของทานเล่น".to_owned()]);
        assert_eq!(snapshot.persona.name, "น้องฟักแฟง");
        assert_eq!(snapshot.settings.shipping_fee(), 40);
        assert!(matches!(
            snapshot.promotions[0].kind,
            PromotionKind::QuantityThresholdFreeItem { threshold: 5, free_per_threshold: 1 }
        ));
    }

    #[test]
    fn faqs_are_ordered_by_priority_and_rules_are_parsed() {
        let snapshot = CatalogSnapshot::from_rows(&shop_rows(), Utc::now()).expect("valid catalog");

        assert_eq!(snapshot.faqs[0].id, "shipping");
        assert_eq!(snapshot.faqs[0].keywords, vec!["ค่าส่ง", "ส่งกี่วัน"]);
        assert_eq!(snapshot.faqs[1].priority, DEFAULT_FAQ_PRIORITY);
    }

    #[test]
    fn always_rows_become_the_fallback_answer() {
        let mut rows = shop_rows();
        for (id, priority, answer) in [("catch-all", 500, "ลองพิมพ์ชื่อสินค้าดูนะคะ"), ("late", 900, "ไม่ใช้")] {
            rows.faqs.push(FaqRow {
                id: id.to_owned(),
                question: String::new(),
                rule: "always:*".to_owned(),
                answer: answer.to_owned(),
                priority: Some(priority),
            });
        }

        let snapshot = CatalogSnapshot::from_rows(&rows, Utc::now()).expect("valid catalog");

        assert_eq!(snapshot.faqs.len(), 2);
        let fallback = snapshot.fallback_faq.expect("fallback row kept");
        assert_eq!(fallback.id, "catch-all");
        assert_eq!(fallback.answer_template, "ลองพิมพ์ชื่อสินค้าดูนะคะ");
        assert!(CatalogSnapshot::from_rows(&shop_rows(), Utc::now()).expect("valid").fallback_faq.is_none());
    }

    #[test]
    fn unsupported_faq_rule_kind_rejects_the_snapshot() {
        let mut rows = shop_rows();
        rows.faqs[1].rule = "regex:.*".to_owned();

        assert!(matches!(
            CatalogSnapshot::from_rows(&rows, Utc::now()),
            Err(CatalogError::InvalidFaqRule { ref id, .. }) if id == "shelf-life"
        ));
    }

    #[test]
    fn duplicate_codes_reject_the_snapshot() {
        let mut rows = shop_rows();
        rows.products.push(product_row("np01", "ซ้ำ", "", 1));

        assert_eq!(
            CatalogSnapshot::from_rows(&rows, Utc::now()),
            Err(CatalogError::DuplicateProductCode("np01".to_owned()))
        );
    }

    #[test]
    fn negative_price_rejects_the_snapshot() {
        let mut rows = shop_rows();
        rows.products[0].price = -1;

        assert!(matches!(
            CatalogSnapshot::from_rows(&rows, Utc::now()),
            Err(CatalogError::NegativePrice { price: -1, .. })
        ));
    }

    #[test]
    fn unknown_promotion_kind_is_reported_with_its_id() {
        let mut rows = shop_rows();
        rows.promotions.push(PromotionRow {
            id: "P9".to_owned(),
            kind: "lucky_draw".to_owned(),
            ..PromotionRow::default()
        });

        assert!(matches!(
            CatalogSnapshot::from_rows(&rows, Utc::now()),
            Err(CatalogError::InvalidPromotion { ref id, .. }) if id == "P9"
        ));
    }

    #[test]
    fn settings_fall_back_to_default_messages() {
        let snapshot = CatalogSnapshot::from_rows(&shop_rows(), Utc::now()).expect("valid catalog");

        assert!(snapshot.settings.fallback_message().starts_with("ขออภัยค่ะ"));
        assert_eq!(snapshot.settings.shop_name(), Some("ร้านน้ำพริกแม่จันทร์"));
    }
}
