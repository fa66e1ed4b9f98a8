use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogError, FaqEntry};
use crate::domain::session::Stage;
use crate::text::{ascii_digits, normalize_key};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    Greet,
    AskIdentity,
    AskPromotion,
    AskPayment,
    ViewCart,
    ConfirmCheckout,
    CancelCart,
    ProvideAddress,
    ProvidePhone,
    FaqMatch { faq_id: String },
    CategoryBrowse { category: Option<String> },
    FreeText,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greet => "greet",
            Self::AskIdentity => "ask_identity",
            Self::AskPromotion => "ask_promotion",
            Self::AskPayment => "ask_payment",
            Self::ViewCart => "view_cart",
            Self::ConfirmCheckout => "confirm_checkout",
            Self::CancelCart => "cancel_cart",
            Self::ProvideAddress => "provide_address",
            Self::ProvidePhone => "provide_phone",
            Self::FaqMatch { .. } => "faq_match",
            Self::CategoryBrowse { .. } => "category_browse",
            Self::FreeText => "free_text",
        }
    }
}

const CANCEL_WORDS: &[&str] =
    &["ยกเลิก", "ไม่เอาแล้ว", "ล้างตะกร้า", "เคลียร์ตะกร้า", "cancel"];
const CHECKOUT_WORDS: &[&str] = &[
    "ยืนยัน", "เช็คเอาท์", "เช็คบิล", "ปิดออเดอร์", "คิดเงิน", "สรุปยอด", "checkout", "confirm",
];
const VIEW_CART_WORDS: &[&str] = &["ตะกร้า", "สั่งอะไรไปบ้าง", "ยอดรวม", "cart"];
const PROMOTION_WORDS: &[&str] = &[
    "โปรโมชั่น", "โปรโมชัน", "มีโปร", "โปรไหม", "ส่วนลด", "ลดราคา", "promotion", "promo", "discount",
    "sale",
];
const PAYMENT_WORDS: &[&str] = &[
    "ชำระ", "จ่ายเงิน", "โอนเงิน", "โอนยังไง", "จ่ายยังไง", "เลขบัญชี", "พร้อมเพย์", "promptpay",
    "payment",
];
const IDENTITY_WORDS: &[&str] =
    &["คุณคือใคร", "เป็นใคร", "ใครคะ", "ใครครับ", "ชื่ออะไร", "บอทหรือ", "who are you", "your name"];
const GREETING_WORDS: &[&str] = &["สวัสดี", "หวัดดี"];
const BROWSE_WORDS: &[&str] =
    &["อะไรบ้าง", "มีอะไร", "ขายอะไร", "เมนู", "รายการสินค้า", "สินค้าทั้งหมด", "menu", "catalog"];
const ADDRESS_MARKERS: &[&str] = &[
    "บ้านเลขที่", "หมู่", "ม.", "ซอย", "ซ.", "ถนน", "ถ.", "ตำบล", "ต.", "แขวง", "อำเภอ", "อ.", "เขต",
    "จังหวัด", "จ.",
];
const QUANTITY_UNITS: &str = "ชิ้น|กล่อง|กระปุก|ขวด|ถุง|แพ็ค|แพ็ก|อัน|ห่อ|ซอง|ตัว|คัน|ชุด|pcs|pc|x";

#[derive(Clone, Debug)]
enum Matcher {
    AnyKeyword(Vec<String>),
    AnyKeywordOrPattern(Vec<String>, Regex),
}

impl Matcher {
    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|word| normalize_key(word)).collect()
    }

    fn is_match(&self, normalized: &str, raw: &str) -> bool {
        match self {
            Self::AnyKeyword(words) => words.iter().any(|word| normalized.contains(word.as_str())),
            Self::AnyKeywordOrPattern(words, pattern) => {
                words.iter().any(|word| normalized.contains(word.as_str())) || pattern.is_match(raw)
            }
        }
    }
}

#[derive(Clone, Debug)]
struct Rule {
    intent: Intent,
    matcher: Matcher,
}

/// Keyword and pattern classifier. Rules are evaluated in table order and the
/// first match wins; FAQ keywords come after the fixed rules and before browsing.
#[derive(Clone, Debug)]
pub struct IntentClassifier {
    rules: Vec<Rule>,
    faqs: Vec<(String, Vec<String>)>,
    categories: Vec<(String, String)>,
    browse: Matcher,
    address: Matcher,
    phone: Regex,
    quantity_with_unit: Regex,
    integer: Regex,
}

fn compile(pattern: &str) -> Result<Regex, CatalogError> {
    Regex::new(pattern).map_err(|error| CatalogError::InvalidPattern(error.to_string()))
}

impl IntentClassifier {
    /// `faqs` must already be in priority order; `categories` are display names.
    pub fn new(faqs: &[FaqEntry], categories: &[String]) -> Result<Self, CatalogError> {
        let rules = vec![
            Rule { intent: Intent::CancelCart, matcher: Matcher::AnyKeyword(Matcher::keywords(CANCEL_WORDS)) },
            Rule {
                intent: Intent::ConfirmCheckout,
                matcher: Matcher::AnyKeyword(Matcher::keywords(CHECKOUT_WORDS)),
            },
            Rule { intent: Intent::ViewCart, matcher: Matcher::AnyKeyword(Matcher::keywords(VIEW_CART_WORDS)) },
            Rule {
                intent: Intent::AskPromotion,
                matcher: Matcher::AnyKeyword(Matcher::keywords(PROMOTION_WORDS)),
            },
            Rule { intent: Intent::AskPayment, matcher: Matcher::AnyKeyword(Matcher::keywords(PAYMENT_WORDS)) },
            Rule {
                intent: Intent::AskIdentity,
                matcher: Matcher::AnyKeyword(Matcher::keywords(IDENTITY_WORDS)),
            },
            Rule {
                intent: Intent::Greet,
                matcher: Matcher::AnyKeywordOrPattern(
                    Matcher::keywords(GREETING_WORDS),
                    compile(r"(?i)\b(hi|hello|hey)\b")?,
                ),
            },
        ];

        Ok(Self {
            rules,
            faqs: faqs.iter().map(|faq| (faq.id.clone(), faq.keywords.clone())).collect(),
            categories: categories
                .iter()
                .map(|category| (normalize_key(category), category.clone()))
                .filter(|(key, _)| !key.is_empty())
                .collect(),
            browse: Matcher::AnyKeyword(Matcher::keywords(BROWSE_WORDS)),
            address: Matcher::AnyKeywordOrPattern(
                Matcher::keywords(ADDRESS_MARKERS),
                compile(r"(?:^|\D)\d{5}(?:\D|$)")?,
            ),
            phone: compile(r"(?:\+66|0)\d(?:[ -]?\d){7,8}")?,
            quantity_with_unit: compile(&format!(r"(?i)(\d+)\s*(?:{QUANTITY_UNITS})"))?,
            integer: compile(r"\d+")?,
        })
    }

    pub fn classify(&self, text: &str, stage: Stage) -> Intent {
        let raw = ascii_digits(text);
        let normalized = normalize_key(&raw);
        let collecting = stage == Stage::CollectingDeliveryInfo;

        // Cancel, checkout and cart lookups always win so customers can leave any stage.
        for rule in self.rules.iter().take(3) {
            if rule.matcher.is_match(&normalized, &raw) {
                return rule.intent.clone();
            }
        }

        if collecting {
            if self.extract_phone(&raw).is_some() {
                return Intent::ProvidePhone;
            }
            if self.address.is_match(&normalized, &raw) {
                return Intent::ProvideAddress;
            }
        }

        for rule in self.rules.iter().skip(3) {
            if rule.matcher.is_match(&normalized, &raw) {
                return rule.intent.clone();
            }
        }

        if let Some((faq_id, _)) = self
            .faqs
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| normalized.contains(keyword.as_str())))
        {
            return Intent::FaqMatch { faq_id: faq_id.clone() };
        }

        if self.browse.is_match(&normalized, &raw) {
            let category = self
                .categories
                .iter()
                .find(|(key, _)| normalized.contains(key.as_str()))
                .map(|(_, name)| name.clone());
            return Intent::CategoryBrowse { category };
        }

        if collecting {
            Intent::ProvideAddress
        } else if self.extract_phone(&raw).is_some() {
            Intent::ProvidePhone
        } else {
            Intent::FreeText
        }
    }

    /// First phone-shaped token as plain digits, `+66` rewritten to a leading `0`.
    pub fn extract_phone(&self, text: &str) -> Option<String> {
        self.phone_span(text).map(|(start, end)| {
            let raw = ascii_digits(text);
            let digits: String = raw[start..end].chars().filter(char::is_ascii_digit).collect();
            match digits.strip_prefix("66") {
                Some(rest) if raw[start..end].starts_with('+') => format!("0{rest}"),
                _ => digits,
            }
        })
    }

    /// The text with the phone token removed and surrounding whitespace trimmed.
    pub fn strip_phone(&self, text: &str) -> String {
        let raw = ascii_digits(text);
        match self.phone_span(&raw) {
            Some((start, end)) => format!("{} {}", &raw[..start], &raw[end..]).trim().to_owned(),
            None => raw.trim().to_owned(),
        }
    }

    /// Candidates may overlap (a postal code running into the phone), so a rejected
    /// match restarts the search one byte past its start rather than past its end.
    fn phone_span(&self, text: &str) -> Option<(usize, usize)> {
        let raw = ascii_digits(text);
        let mut from = 0;
        while let Some(found) = self.phone.find_at(&raw, from) {
            let before = raw[..found.start()].chars().next_back();
            let after = raw[found.end()..].chars().next();
            if !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit()) {
                return Some((found.start(), found.end()));
            }
            // Matches start on `0` or `+`, so the next byte is a char boundary.
            from = found.start() + 1;
        }
        None
    }

    /// A positive quantity, preferring a number followed by a unit word.
    pub fn extract_quantity(&self, text: &str) -> Option<u32> {
        let raw = ascii_digits(text);
        let with_unit = self
            .quantity_with_unit
            .captures(&raw)
            .and_then(|captures| captures.get(1))
            .map(|found| found.as_str().to_owned());
        let candidate = with_unit
            .or_else(|| self.integer.find(&raw).map(|found| found.as_str().to_owned()))?;
        candidate.parse::<u32>().ok().filter(|quantity| *quantity > 0)
    }
}
