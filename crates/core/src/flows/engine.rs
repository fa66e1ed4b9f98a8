use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::catalog::{CatalogView, Resolution};
use crate::domain::cart::{Cart, CartItem};
use crate::domain::product::Product;
use crate::domain::session::{PendingItem, Session, Stage};
use crate::flows::replies;
use crate::flows::states::{ReplyDirective, ReplyText, SideEffect, ToneRequest, Turn, TurnOutcome};
use crate::intent::Intent;
use crate::orders::OrderFinalizer;
use crate::pricing::{DeterministicPricingEngine, PricingContext, PricingEngine, PromotionResult};
use crate::template::{answer_values, render_or_literal};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSettings {
    pub min_address_chars: usize,
    pub max_disambiguation_choices: usize,
    pub max_quantity: u32,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self { min_address_chars: 15, max_disambiguation_choices: 5, max_quantity: 999 }
    }
}

/// Wall clock for one turn plus the shop-local date used for promotion windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnClock {
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

impl TurnClock {
    pub fn at(now: DateTime<Utc>, utc_offset_hours: i32) -> Self {
        let today = (now + Duration::hours(i64::from(utc_offset_hours))).date_naive();
        Self { now, today }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("stage {stage} requires a pending item but none is set")]
    MissingPendingItem { stage: &'static str },
    #[error("checkout reached finalization with an empty cart")]
    EmptyCartAtCheckout,
}

type Transition = (ReplyDirective, Vec<SideEffect>);

/// The conversation state machine. `step` never mutates its input: it works on a
/// copy of the session and returns the copy, so a failed turn leaves nothing behind.
pub struct ConversationEngine<P = DeterministicPricingEngine> {
    pricing: P,
    finalizer: OrderFinalizer,
    settings: ConversationSettings,
}

impl Default for ConversationEngine<DeterministicPricingEngine> {
    fn default() -> Self {
        Self::new(DeterministicPricingEngine, OrderFinalizer::default(), ConversationSettings::default())
    }
}

impl<P> ConversationEngine<P>
where
    P: PricingEngine,
{
    pub fn new(pricing: P, finalizer: OrderFinalizer, settings: ConversationSettings) -> Self {
        Self { pricing, finalizer, settings }
    }

    pub fn settings(&self) -> &ConversationSettings {
        &self.settings
    }

    pub fn price(&self, cart: &Cart, view: &CatalogView, clock: TurnClock) -> PromotionResult {
        let snapshot = view.snapshot();
        let context =
            PricingContext { today: clock.today, shipping_fee: snapshot.settings.shipping_fee() };
        self.pricing.evaluate(cart, &snapshot.promotions, &context)
    }

    pub fn step(
        &self,
        session: &Session,
        view: &CatalogView,
        text: &str,
        clock: TurnClock,
    ) -> Result<Turn, FlowError> {
        let intent = view.classifier().classify(text, session.stage);
        let mut next = session.clone();
        next.last_activity = clock.now;

        let (reply, effects) = self.transition(&mut next, &intent, view, text, clock)?;
        let outcome = TurnOutcome { from: session.stage, to: next.stage, intent, reply, effects };
        Ok(Turn { session: next, outcome })
    }

    pub fn step_with_audit<S>(
        &self,
        session: &Session,
        view: &CatalogView,
        text: &str,
        clock: TurnClock,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<Turn, FlowError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.step(session, view, text, clock);
        match &result {
            Ok(turn) => {
                let outcome = &turn.outcome;
                sink.emit(
                    audit
                        .event("flow.transition_applied", AuditCategory::Flow, AuditOutcome::Success)
                        .with_metadata("from", outcome.from.as_str())
                        .with_metadata("to", outcome.to.as_str())
                        .with_metadata("intent", outcome.intent.as_str())
                        .with_metadata("cart_lines", turn.session.cart.len().to_string()),
                );
                if let Some(order) = outcome.order() {
                    sink.emit(
                        audit
                            .event("order.finalized", AuditCategory::Pricing, AuditOutcome::Success)
                            .with_metadata("order_id", order.id.0.clone())
                            .with_metadata("total", order.total.to_string())
                            .with_metadata("discount", order.discount.to_string())
                            .with_metadata("catalog_revision", order.catalog_revision.clone()),
                    );
                }
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event("flow.transition_rejected", AuditCategory::Flow, AuditOutcome::Rejected)
                        .with_metadata("stage", session.stage.as_str())
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    fn transition(
        &self,
        session: &mut Session,
        intent: &Intent,
        view: &CatalogView,
        text: &str,
        clock: TurnClock,
    ) -> Result<Transition, FlowError> {
        use Stage::{CollectingDeliveryInfo, Confirming, Idle, PickingQuantity, PickingVariant};

        let snapshot = view.snapshot();
        let transition = match (session.stage, intent) {
            (_, Intent::CancelCart) => self.cancel(session, clock),
            (_, Intent::ViewCart) => {
                let pricing = self.price(&session.cart, view, clock);
                self.digression(session, replies::cart_summary(&session.cart, &pricing))
            }
            (_, Intent::Greet) => self.digression(session, snapshot.settings.greeting().to_owned()),
            (_, Intent::AskIdentity) => self.digression(
                session,
                replies::identity(&snapshot.persona, snapshot.settings.shop_name()),
            ),
            (_, Intent::AskPromotion) => {
                let pricing = (!session.cart.is_empty())
                    .then(|| self.price(&session.cart, view, clock));
                let answer =
                    replies::promotions(&snapshot.active_promotions(clock.today), pricing.as_ref());
                self.digression(session, answer)
            }
            (_, Intent::AskPayment) => self.digression(session, replies::payment_methods(snapshot)),
            (_, Intent::FaqMatch { faq_id }) => {
                let answer = match snapshot.faqs.iter().find(|faq| &faq.id == faq_id) {
                    Some(faq) => {
                        let product = session.pending.as_ref().map(|pending| &pending.product);
                        render_or_literal(&faq.answer_template, &answer_values(snapshot, clock.today, product))
                    }
                    None => snapshot.settings.fallback_message().to_owned(),
                };
                self.digression(session, answer)
            }
            (_, Intent::CategoryBrowse { category }) => {
                let answer = match category {
                    Some(category) => {
                        replies::category_listing(category, &snapshot.products_in_category(category))
                    }
                    None => replies::catalog_overview(snapshot),
                };
                self.digression(session, answer)
            }
            (Idle | Confirming, Intent::ConfirmCheckout) => self.begin_checkout(session, view, clock)?,
            (PickingVariant | PickingQuantity | CollectingDeliveryInfo, Intent::ConfirmCheckout) => {
                self.reprompt(session)
            }
            (
                CollectingDeliveryInfo,
                Intent::ProvideAddress | Intent::ProvidePhone | Intent::FreeText,
            ) => self.collect_delivery(session, view, text, clock)?,
            (
                Idle | Confirming | PickingVariant | PickingQuantity,
                Intent::ProvideAddress | Intent::ProvidePhone,
            ) => self.reprompt(session),
            (Idle | Confirming, Intent::FreeText) => {
                self.select_product(session, view, text, clock.today)
            }
            (PickingVariant, Intent::FreeText) => self.pick_variant(session, text)?,
            (PickingQuantity, Intent::FreeText) => self.pick_quantity(session, view, text, clock)?,
        };
        Ok(transition)
    }

    fn cancel(&self, session: &mut Session, clock: TurnClock) -> Transition {
        let had_anything = !session.cart.is_empty() || session.pending.is_some();
        session.reset(clock.now);
        let text = if had_anything { replies::cart_cleared() } else { replies::empty_cart() };
        (ReplyDirective::literal(text), Vec::new())
    }

    /// Answers a side question without touching stage, pending item or cart.
    fn digression(&self, session: &Session, answer: String) -> Transition {
        let text = match replies::reminder(session) {
            Some(reminder) => format!("{answer}\n\n{reminder}"),
            None => answer,
        };
        (ReplyDirective::literal(text).with_choices(stage_choices(session)), Vec::new())
    }

    /// Stage-appropriate prompt for an intent the current stage does not accept.
    fn reprompt(&self, session: &Session) -> Transition {
        (
            ReplyDirective::literal(replies::invalid_for_stage(session))
                .with_choices(stage_choices(session)),
            Vec::new(),
        )
    }

    fn select_product(
        &self,
        session: &mut Session,
        view: &CatalogView,
        text: &str,
        today: NaiveDate,
    ) -> Transition {
        match view.resolve(text) {
            Resolution::Unique(product) => self.start_selection(session, product.clone()),
            Resolution::Ambiguous(candidates) => {
                let shown: Vec<&Product> =
                    candidates.into_iter().take(self.settings.max_disambiguation_choices).collect();
                let choices = shown.iter().map(|product| product.name.clone()).collect();
                (ReplyDirective::literal(replies::disambiguation(&shown)).with_choices(choices), Vec::new())
            }
            Resolution::Unknown => {
                let snapshot = view.snapshot();
                let fallback = match &snapshot.fallback_faq {
                    Some(faq) => render_or_literal(&faq.answer_template, &answer_values(snapshot, today, None)),
                    None => snapshot.settings.fallback_message().to_owned(),
                };
                let reply = ReplyDirective {
                    text: ReplyText::Tone(ToneRequest {
                        instruction: replies::unknown_request_instruction(),
                        context: Some(text.trim().to_owned()),
                        fallback,
                    }),
                    quick_choices: stage_choices(session),
                };
                (reply, Vec::new())
            }
        }
    }

    fn start_selection(&self, session: &mut Session, product: Product) -> Transition {
        let pending = PendingItem { product, variant: None };
        let reply = if pending.product.has_variants() {
            session.stage = Stage::PickingVariant;
            ReplyDirective::literal(replies::variant_prompt(&pending.product))
                .with_choices(pending.product.variants.clone())
        } else {
            session.stage = Stage::PickingQuantity;
            ReplyDirective::literal(replies::quantity_prompt(&pending))
        };
        session.pending = Some(pending);
        (reply, Vec::new())
    }

    fn pick_variant(&self, session: &mut Session, text: &str) -> Result<Transition, FlowError> {
        let pending = session
            .pending
            .as_mut()
            .ok_or(FlowError::MissingPendingItem { stage: Stage::PickingVariant.as_str() })?;

        let Some(variant) = pending.product.match_variant(text).map(str::to_owned) else {
            let reply = ReplyDirective::literal(replies::variant_not_found(&pending.product))
                .with_choices(pending.product.variants.clone());
            return Ok((reply, Vec::new()));
        };

        pending.variant = Some(variant);
        let reply = ReplyDirective::literal(replies::quantity_prompt(pending));
        session.stage = Stage::PickingQuantity;
        Ok((reply, Vec::new()))
    }

    fn pick_quantity(
        &self,
        session: &mut Session,
        view: &CatalogView,
        text: &str,
        clock: TurnClock,
    ) -> Result<Transition, FlowError> {
        if session.pending.is_none() {
            return Err(FlowError::MissingPendingItem { stage: Stage::PickingQuantity.as_str() });
        }

        let Some(quantity) = view.classifier().extract_quantity(text) else {
            return Ok((ReplyDirective::literal(replies::quantity_not_found()), Vec::new()));
        };
        let Some(pending) = session.pending.take() else {
            return Err(FlowError::MissingPendingItem { stage: Stage::PickingQuantity.as_str() });
        };
        let in_cart = session.cart.quantity_of(&pending.product.code, pending.variant.as_deref());
        if u64::from(in_cart) + u64::from(quantity) > u64::from(self.settings.max_quantity) {
            let text = replies::quantity_too_large(self.settings.max_quantity, in_cart);
            session.pending = Some(pending);
            return Ok((ReplyDirective::literal(text), Vec::new()));
        }
        let added = session.cart.add(CartItem::from_product(&pending.product, pending.variant, quantity));
        let name = added.display_name();
        session.stage = Stage::Confirming;

        let pricing = self.price(&session.cart, view, clock);
        let text = replies::item_added(&name, quantity, &session.cart, &pricing);
        Ok((ReplyDirective::literal(text).with_choices(replies::cart_choices()), Vec::new()))
    }

    fn begin_checkout(
        &self,
        session: &mut Session,
        view: &CatalogView,
        clock: TurnClock,
    ) -> Result<Transition, FlowError> {
        if session.cart.is_empty() {
            return Ok((ReplyDirective::literal(replies::empty_cart()), Vec::new()));
        }

        session.stage = Stage::CollectingDeliveryInfo;
        if session.has_delivery_info() {
            return self.finalize(session, view, clock);
        }
        let pricing = self.price(&session.cart, view, clock);
        let reply = ReplyDirective::literal(replies::delivery_request(session, &pricing))
            .with_choices(vec![replies::CHOICE_CANCEL.to_owned()]);
        Ok((reply, Vec::new()))
    }

    fn collect_delivery(
        &self,
        session: &mut Session,
        view: &CatalogView,
        text: &str,
        clock: TurnClock,
    ) -> Result<Transition, FlowError> {
        let classifier = view.classifier();
        let phone = classifier.extract_phone(text);
        let remainder = classifier.strip_phone(text);
        let address_long_enough = remainder.chars().count() >= self.settings.min_address_chars;

        let found_phone = phone.is_some();
        if let Some(phone) = phone {
            session.phone = Some(phone);
        }
        if address_long_enough {
            session.address = Some(remainder);
        }

        if session.has_delivery_info() {
            return self.finalize(session, view, clock);
        }

        let text = if !found_phone && !address_long_enough {
            replies::address_too_short(self.settings.min_address_chars)
        } else {
            replies::missing_delivery_info(session)
        };
        Ok((ReplyDirective::literal(text).with_choices(vec![replies::CHOICE_CANCEL.to_owned()]), Vec::new()))
    }

    fn finalize(
        &self,
        session: &mut Session,
        view: &CatalogView,
        clock: TurnClock,
    ) -> Result<Transition, FlowError> {
        if session.cart.is_empty() {
            return Err(FlowError::EmptyCartAtCheckout);
        }

        let pricing = self.price(&session.cart, view, clock);
        let order = self.finalizer.finalize(session, &pricing, view.revision(), clock.now);
        let reply = ReplyDirective::literal(replies::order_confirmation(&order, view.snapshot()));
        let summary = replies::staff_order_summary(&order);
        session.reset(clock.now);
        Ok((reply, vec![SideEffect::PersistOrder(order), SideEffect::NotifyStaff { summary }]))
    }
}

fn stage_choices(session: &Session) -> Vec<String> {
    match session.stage {
        Stage::PickingVariant => session
            .pending
            .as_ref()
            .map(|pending| pending.product.variants.clone())
            .unwrap_or_default(),
        Stage::Confirming => replies::cart_choices(),
        Stage::Idle if !session.cart.is_empty() => replies::cart_choices(),
        Stage::CollectingDeliveryInfo => vec![replies::CHOICE_CANCEL.to_owned()],
        Stage::Idle | Stage::PickingQuantity => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::{ConversationEngine, ConversationSettings, FlowError, TurnClock};
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::catalog::fixtures::shop_rows;
    use crate::catalog::rows::FaqRow;
    use crate::catalog::{CatalogSnapshot, CatalogView};
    use crate::domain::product::ProductCode;
    use crate::domain::session::{CustomerId, Session, Stage};
    use crate::flows::states::{ReplyText, SideEffect};
    use crate::intent::Intent;
    use crate::orders::{OrderFinalizer, SequentialOrderIds};
    use crate::pricing::DeterministicPricingEngine;

    fn clock() -> TurnClock {
        TurnClock::at(Utc.with_ymd_and_hms(2026, 10, 14, 3, 0, 0).single().expect("valid time"), 7)
    }

    fn view() -> CatalogView {
        CatalogView::build(CatalogSnapshot::from_rows(&shop_rows(), clock().now).expect("valid catalog"))
            .expect("view builds")
    }

    fn engine() -> ConversationEngine {
        ConversationEngine::new(
            DeterministicPricingEngine,
            OrderFinalizer::new(Arc::new(SequentialOrderIds::default())),
            ConversationSettings::default(),
        )
    }

    fn session() -> Session {
        Session::new(CustomerId("U1".to_owned()), clock().now)
    }

    fn run(engine: &ConversationEngine, view: &CatalogView, mut session: Session, inputs: &[&str]) -> Session {
        for input in inputs {
            session = engine.step(&session, view, input, clock()).expect("turn succeeds").session;
        }
        session
    }

    #[test]
    fn product_variant_quantity_scenario_fills_the_cart() {
        let engine = engine();
        let view = view();

        let turn = engine.step(&session(), &view, "น้ำพริกเห็ด", clock()).expect("turn");
        assert_eq!(turn.session.stage, Stage::PickingVariant);
        assert_eq!(turn.outcome.reply.quick_choices, vec!["เผ็ดน้อย", "เผ็ดมาก"]);

        let turn = engine.step(&turn.session, &view, "เผ็ดมาก", clock()).expect("turn");
        assert_eq!(turn.session.stage, Stage::PickingQuantity);

        let turn = engine.step(&turn.session, &view, "3", clock()).expect("turn");
        let session = turn.session;
        assert_eq!(session.stage, Stage::Confirming);
        assert!(session.pending.is_none());
        let items = session.cart.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_code, ProductCode("NP01".to_owned()));
        assert_eq!(items[0].variant.as_deref(), Some("เผ็ดมาก"));
        assert_eq!(items[0].unit_price, 60);
        assert_eq!(items[0].quantity, 3);
    }

    #[test]
    fn faq_digression_keeps_the_pending_selection() {
        let engine = engine();
        let view = view();
        let picking = run(&engine, &view, session(), &["น้ำพริกเห็ด"]);

        let turn = engine.step(&picking, &view, "ค่าส่งเท่าไหร่คะ", clock()).expect("turn");

        assert_eq!(turn.outcome.intent, Intent::FaqMatch { faq_id: "shipping".to_owned() });
        assert!(turn.outcome.reply.text.literal().starts_with("ค่าส่ง 40 บาทค่ะ"));
        assert!(turn.outcome.reply.text.literal().contains("น้ำพริกเห็ด"));
        assert_eq!(turn.session.stage, Stage::PickingVariant);
        assert_eq!(turn.session.pending, picking.pending);

        let resumed = engine.step(&turn.session, &view, "เผ็ดน้อย", clock()).expect("turn");
        assert_eq!(resumed.session.stage, Stage::PickingQuantity);
    }

    #[test]
    fn unmatched_variant_relists_options() {
        let engine = engine();
        let view = view();
        let picking = run(&engine, &view, session(), &["น้ำพริกเห็ด"]);

        let turn = engine.step(&picking, &view, "หวานๆ", clock()).expect("turn");

        assert_eq!(turn.session.stage, Stage::PickingVariant);
        assert!(turn.outcome.reply.text.literal().contains("เผ็ดน้อย / เผ็ดมาก"));
    }

    #[test]
    fn missing_quantity_reprompts() {
        let engine = engine();
        let view = view();
        let picking = run(&engine, &view, session(), &["หมูกรอบ"]);
        assert_eq!(picking.stage, Stage::PickingQuantity);

        let turn = engine.step(&picking, &view, "เยอะๆ", clock()).expect("turn");
        assert_eq!(turn.session.stage, Stage::PickingQuantity);
        assert!(turn.session.cart.is_empty());
    }

    #[test]
    fn quantity_above_the_limit_is_refused() {
        let engine = engine();
        let view = view();
        let picking = run(&engine, &view, session(), &["หมูกรอบ"]);

        let turn = engine.step(&picking, &view, "5000", clock()).expect("turn");
        assert_eq!(turn.session.stage, Stage::PickingQuantity);
        assert!(turn.session.cart.is_empty());
    }

    #[test]
    fn repeated_adds_cannot_push_a_line_past_the_limit() {
        let engine = ConversationEngine::new(
            DeterministicPricingEngine,
            OrderFinalizer::new(Arc::new(SequentialOrderIds::default())),
            ConversationSettings { max_quantity: 10, ..ConversationSettings::default() },
        );
        let view = view();
        let picking = run(&engine, &view, session(), &["หมูกรอบ", "8", "หมูกรอบ"]);

        let turn = engine.step(&picking, &view, "3", clock()).expect("turn");
        assert_eq!(turn.session.stage, Stage::PickingQuantity);
        assert_eq!(turn.session.cart.items()[0].quantity, 8);
        assert!(turn.session.pending.is_some());
        assert!(turn.outcome.reply.text.literal().contains("8"));

        let turn = engine.step(&turn.session, &view, "2", clock()).expect("turn");
        assert_eq!(turn.session.stage, Stage::Confirming);
        assert_eq!(turn.session.cart.items()[0].quantity, 10);
    }

    #[test]
    fn adding_the_same_item_twice_merges_quantities() {
        let engine = engine();
        let view = view();
        let session = run(&engine, &view, session(), &["หมูกรอบ", "2", "หมูกรอบ", "4"]);

        assert_eq!(session.cart.len(), 1);
        assert_eq!(session.cart.items()[0].quantity, 6);
    }

    #[test]
    fn ambiguous_text_lists_candidates_without_changing_stage() {
        let engine = engine();
        let view = view();

        let turn = engine.step(&session(), &view, "น้ำพริกเห็ดกับน้ำพริกกุ้ง", clock()).expect("turn");

        assert_eq!(turn.session.stage, Stage::Idle);
        assert!(turn.session.pending.is_none());
        assert_eq!(turn.outcome.reply.quick_choices, vec!["น้ำพริกเห็ด", "น้ำพริกกุ้ง"]);
    }

    #[test]
    fn unknown_text_goes_to_the_tone_collaborator_with_fallback() {
        let engine = engine();
        let view = view();

        let turn = engine.step(&session(), &view, "มีไอศกรีมไหม", clock()).expect("turn");

        assert_eq!(turn.session.stage, Stage::Idle);
        match &turn.outcome.reply.text {
            ReplyText::Tone(request) => {
                assert_eq!(request.context.as_deref(), Some("มีไอศกรีมไหม"));
                assert!(request.fallback.starts_with("ขออภัยค่ะ"));
            }
            ReplyText::Literal(text) => panic!("expected tone request, got literal {text}"),
        }
    }

    #[test]
    fn catch_all_faq_answer_replaces_the_fallback_message() {
        let engine = engine();
        let mut rows = shop_rows();
        rows.faqs.push(FaqRow {
            id: "catch-all".to_owned(),
            question: String::new(),
            rule: "always:*".to_owned(),
            answer: "{{ shop_name }} ยังไม่มีสินค้านี้ค่ะ".to_owned(),
            priority: Some(999),
        });
        let view = CatalogView::build(CatalogSnapshot::from_rows(&rows, clock().now).expect("valid catalog"))
            .expect("view builds");

        let turn = engine.step(&session(), &view, "มีไอศกรีมไหม", clock()).expect("turn");

        match &turn.outcome.reply.text {
            ReplyText::Tone(request) => {
                assert_eq!(request.fallback, "ร้านน้ำพริกแม่จันทร์ ยังไม่มีสินค้านี้ค่ะ");
            }
            ReplyText::Literal(text) => panic!("expected tone request, got literal {text}"),
        }
        let faq = engine.step(&session(), &view, "ค่าส่งเท่าไหร่", clock()).expect("turn");
        assert_eq!(faq.outcome.intent, Intent::FaqMatch { faq_id: "shipping".to_owned() });
    }

    #[test]
    fn checkout_with_an_empty_cart_stays_idle() {
        let engine = engine();
        let view = view();

        let turn = engine.step(&session(), &view, "ยืนยันสั่งซื้อ", clock()).expect("turn");

        assert_eq!(turn.outcome.intent, Intent::ConfirmCheckout);
        assert_eq!(turn.session.stage, Stage::Idle);
    }

    #[test]
    fn checkout_needs_both_phone_and_a_long_enough_address() {
        let engine = engine();
        let view = view();
        let collecting = run(&engine, &view, session(), &["หมูกรอบ", "2", "ยืนยัน"]);
        assert_eq!(collecting.stage, Stage::CollectingDeliveryInfo);

        let short = engine.step(&collecting, &view, "บ้านฉัน", clock()).expect("turn");
        assert_eq!(short.session.stage, Stage::CollectingDeliveryInfo);
        assert!(short.session.address.is_none());

        let phone_only = engine.step(&short.session, &view, "0812345678", clock()).expect("turn");
        assert_eq!(phone_only.session.stage, Stage::CollectingDeliveryInfo);
        assert_eq!(phone_only.session.phone.as_deref(), Some("0812345678"));
        assert!(phone_only.outcome.order().is_none());

        let done = engine
            .step(&phone_only.session, &view, "99/1 ซอยสุขุมวิท 11 กรุงเทพ 10110", clock())
            .expect("turn");
        let order = done.outcome.order().expect("order produced").clone();
        assert_eq!(order.id.0, "ORD-20261014-0001");
        assert_eq!(order.total, 240);
        assert_eq!(order.address, "99/1 ซอยสุขุมวิท 11 กรุงเทพ 10110");
        assert!(matches!(done.outcome.effects[1], SideEffect::NotifyStaff { .. }));
        assert_eq!(done.session.stage, Stage::Idle);
        assert!(done.session.cart.is_empty());
        assert!(done.session.phone.is_none());
    }

    #[test]
    fn address_and_phone_in_one_message_complete_the_order() {
        let engine = engine();
        let view = view();
        let collecting = run(&engine, &view, session(), &["น้ำพริกกุ้ง", "5", "เช็คบิล"]);

        let done = engine
            .step(&collecting, &view, "12/3 ถ.นิมมานเหมินท์ เชียงใหม่ 50200 โทร 081-234-5678", clock())
            .expect("turn");

        let order = done.outcome.order().expect("order produced");
        assert_eq!(order.phone, "0812345678");
        assert_eq!(order.discount, 80);
        assert_eq!(order.promotion_description.as_deref(), Some("ซื้อ 5 แถม 1 — น้ำพริกทุกรส"));
    }

    #[test]
    fn phone_right_after_the_postal_code_completes_the_order() {
        let engine = engine();
        let view = view();
        let collecting = run(&engine, &view, session(), &["หมูกรอบ", "1", "ยืนยัน"]);

        let done = engine
            .step(&collecting, &view, "99/1 ซอยสุขุมวิท 11 กรุงเทพ 10110 0812345678", clock())
            .expect("turn");

        let order = done.outcome.order().expect("order produced");
        assert_eq!(order.phone, "0812345678");
        assert_eq!(order.address, "99/1 ซอยสุขุมวิท 11 กรุงเทพ 10110");
        assert_eq!(done.session.stage, Stage::Idle);
    }

    #[test]
    fn cancel_clears_everything_from_any_stage() {
        let engine = engine();
        let view = view();
        let picking = run(&engine, &view, session(), &["หมูกรอบ", "2", "น้ำพริกเห็ด"]);
        assert_eq!(picking.stage, Stage::PickingVariant);

        let turn = engine.step(&picking, &view, "ยกเลิก", clock()).expect("turn");

        assert_eq!(turn.session.stage, Stage::Idle);
        assert!(turn.session.cart.is_empty());
        assert!(turn.session.pending.is_none());
    }

    #[test]
    fn phone_outside_delivery_collection_is_a_reprompt() {
        let engine = engine();
        let view = view();
        let picking = run(&engine, &view, session(), &["หมูกรอบ"]);

        let turn = engine.step(&picking, &view, "0812345678", clock()).expect("turn");

        assert_eq!(turn.session, {
            let mut expected = picking.clone();
            expected.last_activity = clock().now;
            expected
        });
        assert!(turn.outcome.reply.text.literal().contains("หมูกรอบ"));
    }

    #[test]
    fn checkout_during_selection_is_a_reprompt() {
        let engine = engine();
        let view = view();
        let picking = run(&engine, &view, session(), &["หมูกรอบ", "1", "น้ำพริกเห็ด"]);

        let turn = engine.step(&picking, &view, "ยืนยัน", clock()).expect("turn");
        assert_eq!(turn.session.stage, Stage::PickingVariant);
    }

    #[test]
    fn corrupted_session_is_rejected_without_mutation() {
        let engine = engine();
        let view = view();
        let mut broken = session();
        broken.stage = Stage::PickingQuantity;

        let error = engine.step(&broken, &view, "3", clock()).expect_err("no pending item");
        assert!(matches!(error, FlowError::MissingPendingItem { .. }));
        assert_eq!(broken.stage, Stage::PickingQuantity);
    }

    #[test]
    fn promotion_question_reports_the_current_discount() {
        let engine = engine();
        let view = view();
        let session = run(&engine, &view, session(), &["น้ำพริกกุ้ง", "5"]);

        let turn = engine.step(&session, &view, "มีโปรไหมคะ", clock()).expect("turn");
        let text = turn.outcome.reply.text.literal();

        assert!(text.contains("ซื้อ 5 แถม 1 — น้ำพริกทุกรส"));
        assert!(text.contains("ส่วนลด 80 บาท"));
        assert_eq!(turn.session.stage, Stage::Confirming);
    }

    #[test]
    fn audit_events_record_transitions_and_orders() {
        let engine = engine();
        let view = view();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(Some(CustomerId("U1".to_owned())), "req-7", "conversation-engine");
        let mut session = session();
        session.stage = Stage::CollectingDeliveryInfo;
        session.cart = run(&engine, &view, Session::new(CustomerId("U1".to_owned()), clock().now), &["หมูกรอบ", "1"])
            .cart;
        session.phone = Some("0812345678".to_owned());

        engine
            .step_with_audit(&session, &view, "99/1 ซอยสุขุมวิท 11 กรุงเทพ 10110", clock(), &sink, &audit)
            .expect("turn");

        assert_eq!(
            sink.event_types(),
            vec!["flow.transition_applied".to_owned(), "order.finalized".to_owned()]
        );
        assert_eq!(sink.events()[0].metadata.get("to").map(String::as_str), Some("idle"));
    }
}
