pub mod promotions;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::cart::Cart;
use crate::domain::promotion::{Promotion, PromotionId};

use self::promotions::{discount_for, MatchingLines};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingContext {
    /// Shop-local date used for promotion validity windows.
    pub today: NaiveDate,
    pub shipping_fee: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromotion {
    pub id: PromotionId,
    pub description: String,
    pub discount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionResult {
    pub subtotal: u64,
    pub total_discount: u64,
    pub applied: Vec<AppliedPromotion>,
    pub total: u64,
}

impl PromotionResult {
    pub fn descriptions(&self) -> Vec<String> {
        self.applied.iter().map(|applied| applied.description.clone()).collect()
    }

    /// Descriptions joined for a single order field; `None` when nothing applied.
    pub fn summary(&self) -> Option<String> {
        if self.applied.is_empty() {
            None
        } else {
            Some(self.descriptions().join(", "))
        }
    }
}

pub trait PricingEngine: Send + Sync {
    fn evaluate(
        &self,
        cart: &Cart,
        promotions: &[Promotion],
        context: &PricingContext,
    ) -> PromotionResult;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicPricingEngine;

impl PricingEngine for DeterministicPricingEngine {
    fn evaluate(
        &self,
        cart: &Cart,
        promotions: &[Promotion],
        context: &PricingContext,
    ) -> PromotionResult {
        evaluate_promotions(cart, promotions, context)
    }
}

/// Evaluates every promotion against the cart and keeps the single largest
/// discount. Ties go to the promotion listed first. When the promotions marked
/// `combinable` add up to more than the best single one, all of them apply.
/// The discount never exceeds the cart subtotal.
pub fn evaluate_promotions(
    cart: &Cart,
    promotions: &[Promotion],
    context: &PricingContext,
) -> PromotionResult {
    let subtotal = cart.subtotal();

    let candidates: Vec<(&Promotion, u64)> = promotions
        .iter()
        .filter(|promotion| promotion.is_active_on(context.today))
        .filter_map(|promotion| {
            let matching = MatchingLines::collect(promotion, cart);
            if matching.is_empty() || !matching.meets(promotion) {
                return None;
            }
            let discount = discount_for(&promotion.kind, &matching, context.shipping_fee);
            (discount > 0).then_some((promotion, discount))
        })
        .collect();

    let mut best: Option<(&Promotion, u64)> = None;
    for &(promotion, discount) in &candidates {
        if best.map_or(true, |(_, best_discount)| discount > best_discount) {
            best = Some((promotion, discount));
        }
    }

    let combinable: Vec<(&Promotion, u64)> =
        candidates.iter().copied().filter(|(promotion, _)| promotion.combinable).collect();
    let combinable_total: u64 = combinable.iter().map(|(_, discount)| discount).sum();
    let best_total = best.map_or(0, |(_, discount)| discount);

    let chosen = if combinable.len() > 1 && combinable_total > best_total {
        combinable
    } else {
        best.into_iter().collect()
    };

    let mut remaining = subtotal;
    let applied: Vec<AppliedPromotion> = chosen
        .into_iter()
        .map(|(promotion, discount)| {
            let granted = discount.min(remaining);
            remaining -= granted;
            AppliedPromotion { id: promotion.id.clone(), description: promotion.one_line(), discount: granted }
        })
        .filter(|applied| applied.discount > 0)
        .collect();

    let total_discount = applied.iter().map(|applied| applied.discount).sum();
    PromotionResult { subtotal, total_discount, applied, total: subtotal - total_discount }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{DeterministicPricingEngine, PricingContext, PricingEngine};
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::product::ProductCode;
    use crate::domain::promotion::{
        Applicability, Promotion, PromotionCondition, PromotionId, PromotionKind,
    };

    fn context() -> PricingContext {
        PricingContext {
            today: NaiveDate::from_ymd_opt(2026, 10, 14).expect("valid date"),
            shipping_fee: 40,
        }
    }

    fn item(code: &str, category: &str, price: u64, quantity: u32) -> CartItem {
        CartItem {
            product_code: ProductCode(code.to_owned()),
            name: code.to_owned(),
            category: category.to_owned(),
            variant: None,
            unit_price: price,
            quantity,
        }
    }

    fn promotion(id: &str, kind: PromotionKind) -> Promotion {
        Promotion {
            id: PromotionId(id.to_owned()),
            title: id.to_owned(),
            description: String::new(),
            kind,
            condition: PromotionCondition::default(),
            applies_to: Applicability::All,
            combinable: false,
            starts_on: None,
            ends_on: None,
        }
    }

    fn free_item_every_five() -> Promotion {
        promotion("buy5", PromotionKind::QuantityThresholdFreeItem { threshold: 5, free_per_threshold: 1 })
    }

    #[test]
    fn twelve_units_with_threshold_five_discount_the_two_cheapest() {
        let mut cart = Cart::default();
        cart.add(item("NP01", "น้ำพริก", 60, 4));
        cart.add(item("NP02", "น้ำพริก", 50, 1));
        cart.add(item("NP03", "น้ำพริก", 90, 7));

        let result = DeterministicPricingEngine.evaluate(&cart, &[free_item_every_five()], &context());

        assert_eq!(result.total_discount, 50 + 60);
        assert_eq!(result.descriptions(), vec!["buy5".to_owned()]);
        assert_eq!(result.total, result.subtotal - 110);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let mut cart = Cart::default();
        cart.add(item("NP01", "น้ำพริก", 60, 6));
        let promotions = vec![
            free_item_every_five(),
            promotion("ten", PromotionKind::PercentageDiscount { percent: Decimal::TEN }),
        ];

        let first = DeterministicPricingEngine.evaluate(&cart, &promotions, &context());
        let second = DeterministicPricingEngine.evaluate(&cart, &promotions, &context());
        assert_eq!(first, second);
    }

    #[test]
    fn only_the_largest_discount_applies() {
        let mut cart = Cart::default();
        cart.add(item("NP01", "น้ำพริก", 60, 5));
        let promotions = vec![
            free_item_every_five(),
            promotion("ten", PromotionKind::PercentageDiscount { percent: Decimal::TEN }),
            promotion("ship", PromotionKind::FreeShipping),
        ];

        let result = DeterministicPricingEngine.evaluate(&cart, &promotions, &context());

        assert_eq!(result.total_discount, 60);
        assert_eq!(result.applied.len(), 1);
        assert_eq!(result.applied[0].id.0, "buy5");
    }

    #[test]
    fn ties_go_to_the_first_listed_promotion() {
        let mut cart = Cart::default();
        cart.add(item("NP01", "น้ำพริก", 200, 1));
        let promotions = vec![
            promotion("fixed", PromotionKind::FixedAmountDiscount { amount: 20 }),
            promotion("ten", PromotionKind::PercentageDiscount { percent: Decimal::TEN }),
        ];

        let result = DeterministicPricingEngine.evaluate(&cart, &promotions, &context());
        assert_eq!(result.applied[0].id.0, "fixed");
    }

    #[test]
    fn combinable_promotions_sum_when_larger_than_the_best_single() {
        let mut cart = Cart::default();
        cart.add(item("NP01", "น้ำพริก", 100, 2));
        let mut ship = promotion("ship", PromotionKind::FreeShipping);
        ship.combinable = true;
        let mut ten = promotion("ten", PromotionKind::PercentageDiscount { percent: Decimal::TEN });
        ten.combinable = true;
        let fixed = promotion("fixed", PromotionKind::FixedAmountDiscount { amount: 50 });

        let result = DeterministicPricingEngine.evaluate(&cart, &[fixed, ship, ten], &context());

        assert_eq!(result.total_discount, 40 + 20);
        assert_eq!(result.applied.len(), 2);
    }

    #[test]
    fn conditions_and_windows_gate_eligibility() {
        let mut cart = Cart::default();
        cart.add(item("NP01", "น้ำพริก", 60, 2));
        let mut minimum = promotion("min", PromotionKind::FixedAmountDiscount { amount: 10 });
        minimum.condition.min_amount = 500;
        let mut expired = promotion("old", PromotionKind::FixedAmountDiscount { amount: 10 });
        expired.ends_on = NaiveDate::from_ymd_opt(2026, 10, 13);
        let mut other_category = promotion("snack", PromotionKind::FixedAmountDiscount { amount: 10 });
        other_category.applies_to = Applicability::from_cells(&[], &["ของทานเล่น".to_owned()]);

        let result = DeterministicPricingEngine.evaluate(
            &cart,
            &[minimum, expired, other_category],
            &context(),
        );

        assert_eq!(result.total_discount, 0);
        assert!(result.applied.is_empty());
        assert_eq!(result.summary(), None);
    }

    #[test]
    fn free_shipping_never_exceeds_the_subtotal() {
        let mut cart = Cart::default();
        cart.add(item("NP01", "น้ำพริก", 25, 1));

        let result = DeterministicPricingEngine.evaluate(
            &cart,
            &[promotion("ship", PromotionKind::FreeShipping)],
            &context(),
        );

        assert_eq!(result.total_discount, 25);
        assert_eq!(result.total, 0);
    }
}
