use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use chatcart_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use chatcart_core::catalog::{CatalogStore, CatalogView};
use chatcart_core::collaborators::{OrderSink, StaffMessage, StaffNotifier, ToneGenerator};
use chatcart_core::config::AppConfig;
use chatcart_core::domain::order::OrderRecord;
use chatcart_core::domain::session::CustomerId;
use chatcart_core::flows::{
    ConversationEngine, ReplyDirective, ReplyText, SideEffect, TurnClock,
};
use chatcart_core::sessions::SessionStore;

/// One customer message as it arrives from a channel adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub customer_id: CustomerId,
    pub text: String,
    pub correlation_id: String,
}

impl InboundMessage {
    pub fn new(customer_id: CustomerId, text: impl Into<String>) -> Self {
        Self {
            customer_id,
            text: text.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeReply {
    pub text: String,
    pub quick_choices: Vec<String>,
}

pub struct HandledMessage {
    pub reply: RuntimeReply,
    /// `true` when the turn failed and the customer got the apology text.
    pub failed: bool,
    /// Background persistence and staff notifications for this turn. Dropping
    /// the handle detaches the task.
    pub effects: Option<JoinHandle<()>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub external_call_timeout: Duration,
    pub utc_offset_hours: i32,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            external_call_timeout: Duration::from_millis(
                config.conversation.external_call_timeout_ms,
            ),
            utc_offset_hours: config.conversation.utc_offset_hours,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { external_call_timeout: Duration::from_secs(5), utc_offset_hours: 7 }
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub orders: Arc<dyn OrderSink>,
    pub notifier: Arc<dyn StaffNotifier>,
    pub tone: Arc<dyn ToneGenerator>,
    pub audit: Arc<dyn AuditSink>,
}

/// Handles each inbound message to completion on top of the pure conversation
/// engine: per-customer serialization, commit-on-success, reply phrasing, and
/// the turn's side effects.
pub struct ConversationRuntime {
    engine: ConversationEngine,
    catalog: Arc<CatalogStore>,
    sessions: Arc<dyn SessionStore>,
    collaborators: Collaborators,
    settings: RuntimeSettings,
}

impl ConversationRuntime {
    pub fn new(
        engine: ConversationEngine,
        catalog: Arc<CatalogStore>,
        sessions: Arc<dyn SessionStore>,
        collaborators: Collaborators,
        settings: RuntimeSettings,
    ) -> Self {
        Self { engine, catalog, sessions, collaborators, settings }
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub async fn handle_message(&self, message: InboundMessage) -> HandledMessage {
        let now = Utc::now();
        let clock = TurnClock::at(now, self.settings.utc_offset_hours);
        let audit = AuditContext::new(
            Some(message.customer_id.clone()),
            message.correlation_id.clone(),
            "customer",
        );
        self.collaborators.audit.emit(
            audit
                .event("ingress.message_received", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("text_chars", message.text.chars().count().to_string()),
        );

        let mut lease = self.sessions.acquire(&message.customer_id, now).await;
        let view = self.catalog.current();
        let stage = lease.session().stage;

        let stepped = catch_unwind(AssertUnwindSafe(|| {
            self.engine.step_with_audit(
                lease.session(),
                &view,
                &message.text,
                clock,
                self.collaborators.audit.as_ref(),
                &audit,
            )
        }));

        let turn = match stepped {
            Ok(Ok(turn)) => turn,
            Ok(Err(flow_error)) => {
                drop(lease);
                return self.fail_turn(&message, &view, &audit, flow_error.to_string());
            }
            Err(panic) => {
                drop(lease);
                let detail = panic_detail(panic.as_ref());
                self.collaborators.audit.emit(
                    audit
                        .event("flow.transition_panicked", AuditCategory::Flow, AuditOutcome::Failed)
                        .with_metadata("stage", stage.as_str()),
                );
                return self.fail_turn(&message, &view, &audit, detail);
            }
        };

        let from = turn.outcome.from;
        let to = turn.outcome.to;
        lease.commit(turn.session);
        drop(lease);

        info!(
            event_name = "runtime.turn_applied",
            correlation_id = %message.correlation_id,
            customer_id = %message.customer_id,
            intent = turn.outcome.intent.as_str(),
            from = from.as_str(),
            to = to.as_str(),
            "conversation turn applied"
        );

        let reply = self.phrase(&view, &turn.outcome.reply, &message).await;
        let effects = (!turn.outcome.effects.is_empty()).then(|| {
            let runner = EffectRunner {
                collaborators: self.collaborators.clone(),
                timeout: self.settings.external_call_timeout,
                audit: audit.clone(),
            };
            tokio::spawn(runner.run(message.customer_id.clone(), turn.outcome.effects))
        });

        HandledMessage { reply, failed: false, effects }
    }

    async fn phrase(
        &self,
        view: &CatalogView,
        directive: &ReplyDirective,
        message: &InboundMessage,
    ) -> RuntimeReply {
        let text = match &directive.text {
            ReplyText::Literal(text) => text.clone(),
            ReplyText::Tone(request) => {
                let persona = &view.snapshot().persona;
                let call = self.collaborators.tone.rephrase(persona, request);
                match timeout(self.settings.external_call_timeout, call).await {
                    Ok(Ok(text)) if !text.trim().is_empty() => text,
                    Ok(Ok(_)) => request.fallback.clone(),
                    Ok(Err(tone_error)) => {
                        warn!(
                            event_name = "egress.tone.failed",
                            correlation_id = %message.correlation_id,
                            customer_id = %message.customer_id,
                            error = %tone_error,
                            "tone generation failed; sending fallback text"
                        );
                        request.fallback.clone()
                    }
                    Err(_) => {
                        warn!(
                            event_name = "egress.tone.timed_out",
                            correlation_id = %message.correlation_id,
                            customer_id = %message.customer_id,
                            timeout_ms = self.settings.external_call_timeout.as_millis() as u64,
                            "tone generation timed out; sending fallback text"
                        );
                        request.fallback.clone()
                    }
                }
            }
        };
        RuntimeReply { text, quick_choices: directive.quick_choices.clone() }
    }

    fn fail_turn(
        &self,
        message: &InboundMessage,
        view: &CatalogView,
        audit: &AuditContext,
        detail: String,
    ) -> HandledMessage {
        error!(
            event_name = "runtime.turn_failed",
            correlation_id = %message.correlation_id,
            customer_id = %message.customer_id,
            error = %detail,
            "conversation turn failed; session left unchanged"
        );
        self.collaborators.audit.emit(
            audit
                .event("runtime.turn_failed", AuditCategory::System, AuditOutcome::Failed)
                .with_metadata("error", detail.clone()),
        );

        let notifier = Arc::clone(&self.collaborators.notifier);
        let wait = self.settings.external_call_timeout;
        let staff_message = StaffMessage::InternalError {
            customer_id: message.customer_id.clone(),
            correlation_id: message.correlation_id.clone(),
            detail,
        };
        let correlation_id = message.correlation_id.clone();
        let effects = tokio::spawn(async move {
            match timeout(wait, notifier.notify(staff_message)).await {
                Ok(Ok(())) => {}
                Ok(Err(notify_error)) => warn!(
                    event_name = "egress.staff.notify_failed",
                    correlation_id = %correlation_id,
                    error = %notify_error,
                    "staff error notification failed"
                ),
                Err(_) => warn!(
                    event_name = "egress.staff.notify_timed_out",
                    correlation_id = %correlation_id,
                    "staff error notification timed out"
                ),
            }
        });

        HandledMessage {
            reply: RuntimeReply {
                text: view.snapshot().settings.apology_message().to_owned(),
                quick_choices: Vec::new(),
            },
            failed: true,
            effects: Some(effects),
        }
    }
}

struct EffectRunner {
    collaborators: Collaborators,
    timeout: Duration,
    audit: AuditContext,
}

impl EffectRunner {
    async fn run(self, customer_id: CustomerId, effects: Vec<SideEffect>) {
        let mut placed: Option<OrderRecord> = None;
        for effect in effects {
            match effect {
                SideEffect::PersistOrder(order) => {
                    self.persist(&order).await;
                    placed = Some(order);
                }
                SideEffect::NotifyStaff { summary } => {
                    let Some(order) = placed.as_ref() else {
                        warn!(
                            event_name = "egress.staff.notify_skipped",
                            correlation_id = %self.audit.correlation_id,
                            customer_id = %customer_id,
                            "staff summary without an order in the same turn"
                        );
                        continue;
                    };
                    self.notify(StaffMessage::OrderPlaced {
                        order_id: order.id.clone(),
                        customer_id: customer_id.clone(),
                        summary,
                    })
                    .await;
                }
            }
        }
    }

    async fn persist(&self, order: &OrderRecord) {
        let outcome = timeout(self.timeout, self.collaborators.orders.append(order)).await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(persist_error)) => Some(persist_error.to_string()),
            Err(_) => Some(format!("order append timed out after {}ms", self.timeout.as_millis())),
        };

        match failure {
            None => {
                info!(
                    event_name = "persistence.order.appended",
                    correlation_id = %self.audit.correlation_id,
                    order_id = %order.id,
                    total = order.total,
                    "order appended to ledger"
                );
                self.collaborators.audit.emit(
                    self.audit
                        .event("order.persisted", AuditCategory::Persistence, AuditOutcome::Success)
                        .with_metadata("order_id", order.id.0.clone()),
                );
            }
            Some(detail) => {
                error!(
                    event_name = "persistence.order.append_failed",
                    correlation_id = %self.audit.correlation_id,
                    order_id = %order.id,
                    error = %detail,
                    "order could not be appended to ledger"
                );
                self.collaborators.audit.emit(
                    self.audit
                        .event("order.persist_failed", AuditCategory::Persistence, AuditOutcome::Failed)
                        .with_metadata("order_id", order.id.0.clone())
                        .with_metadata("error", detail),
                );
            }
        }
    }

    async fn notify(&self, message: StaffMessage) {
        match timeout(self.timeout, self.collaborators.notifier.notify(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(notify_error)) => warn!(
                event_name = "egress.staff.notify_failed",
                correlation_id = %self.audit.correlation_id,
                error = %notify_error,
                "staff order notification failed"
            ),
            Err(_) => warn!(
                event_name = "egress.staff.notify_timed_out",
                correlation_id = %self.audit.correlation_id,
                "staff order notification timed out"
            ),
        }
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic in transition: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic in transition: {message}")
    } else {
        "panic in transition".to_owned()
    }
}
