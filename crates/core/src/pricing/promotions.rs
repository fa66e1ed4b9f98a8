use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::cart::{Cart, CartItem};
use crate::domain::promotion::{Promotion, PromotionKind};

/// Cart lines that fall under one promotion's filter, with their aggregates.
#[derive(Clone, Debug)]
pub struct MatchingLines<'a> {
    pub lines: Vec<&'a CartItem>,
    pub quantity: u64,
    pub amount: u64,
}

impl<'a> MatchingLines<'a> {
    pub fn collect(promotion: &Promotion, cart: &'a Cart) -> Self {
        let lines: Vec<&CartItem> = cart
            .items()
            .iter()
            .filter(|item| promotion.applies_to.matches(&item.product_code, &item.category))
            .collect();
        let quantity = lines.iter().map(|item| u64::from(item.quantity)).sum();
        let amount = lines.iter().map(|item| item.line_total()).sum();
        Self { lines, quantity, amount }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn meets(&self, promotion: &Promotion) -> bool {
        self.quantity >= u64::from(promotion.condition.min_quantity)
            && self.amount >= promotion.condition.min_amount
    }
}

/// Discount one promotion would grant on its matching lines, before selection.
pub fn discount_for(kind: &PromotionKind, matching: &MatchingLines<'_>, shipping_fee: u64) -> u64 {
    match kind {
        PromotionKind::QuantityThresholdFreeItem { threshold, free_per_threshold } => {
            let free_units = (matching.quantity / u64::from(*threshold).max(1))
                .saturating_mul(u64::from(*free_per_threshold));
            cheapest_units_total(&matching.lines, free_units)
        }
        PromotionKind::PercentageDiscount { percent } => {
            let raw = Decimal::from(matching.amount) * *percent / Decimal::ONE_HUNDRED;
            raw.floor().to_u64().unwrap_or(0).min(matching.amount)
        }
        PromotionKind::FixedAmountDiscount { amount } => (*amount).min(matching.amount),
        PromotionKind::FreeShipping => shipping_fee,
    }
}

/// Sum of the `units` cheapest unit prices among the lines, counting each unit
/// of quantity separately.
fn cheapest_units_total(lines: &[&CartItem], units: u64) -> u64 {
    let mut prices: Vec<(u64, u64)> =
        lines.iter().map(|item| (item.unit_price, u64::from(item.quantity))).collect();
    prices.sort_by_key(|(price, _)| *price);

    let mut remaining = units;
    let mut total = 0_u64;
    for (price, quantity) in prices {
        if remaining == 0 {
            break;
        }
        let taken = remaining.min(quantity);
        total = total.saturating_add(price.saturating_mul(taken));
        remaining -= taken;
    }
    total
}
