//! LINE webhook ingress.
//!
//! - `POST /callback` verifies `X-Line-Signature` against the raw body, parses
//!   the event batch and answers each text message through the reply API.
//! - `GET /healthz` is mounted by [`crate::health`].

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use chatcart_agent::{ConversationRuntime, InboundMessage};
use chatcart_core::errors::{FailureClass, InterfaceError};
use chatcart_db::DbPool;
use chatcart_line::{
    parse_payload, verify_signature, IncomingText, OutboundMessage, ReplySender, SignatureError,
    SIGNATURE_HEADER,
};

use crate::health;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ConversationRuntime>,
    pub replies: Arc<dyn ReplySender>,
    pub channel_secret: SecretString,
    pub db_pool: DbPool,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub handled: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized { reason: SignatureError, correlation_id: String },
    Interface(InterfaceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthorized { correlation_id, .. } => (
                StatusCode::UNAUTHORIZED,
                ErrorBody { error: "invalid signature".to_owned(), correlation_id },
            ),
            Self::Interface(error) => {
                let status = match error.class {
                    FailureClass::Rejected => StatusCode::BAD_REQUEST,
                    FailureClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    FailureClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let body = ErrorBody {
                    error: error.public_message().to_owned(),
                    correlation_id: error.correlation_id,
                };
                (status, body)
            }
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/callback", post(callback))
        .route("/healthz", get(health::healthz))
        .with_state(state)
}

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());

    if let Err(reason) =
        verify_signature(state.channel_secret.expose_secret().as_bytes(), &body, signature)
    {
        warn!(
            event_name = "ingress.line.signature_rejected",
            correlation_id = %correlation_id,
            customer_id = "-",
            error = %reason,
            "webhook signature rejected"
        );
        return Err(ApiError::Unauthorized { reason, correlation_id });
    }

    let payload = parse_payload(&body).map_err(|parse_error| {
        warn!(
            event_name = "ingress.line.payload_rejected",
            correlation_id = %correlation_id,
            customer_id = "-",
            error = %parse_error,
            "webhook payload could not be parsed"
        );
        ApiError::Interface(InterfaceError::rejected(parse_error.to_string(), correlation_id.clone()))
    })?;

    let messages = payload.text_messages();
    info!(
        event_name = "ingress.line.webhook_received",
        correlation_id = %correlation_id,
        customer_id = "-",
        events = payload.events.len(),
        text_messages = messages.len(),
        "webhook accepted"
    );

    let handled = messages.len();
    for (index, incoming) in messages.into_iter().enumerate() {
        answer(&state, incoming, format!("{correlation_id}-{index}")).await;
    }

    Ok(Json(WebhookAck { handled }))
}

async fn answer(state: &AppState, incoming: IncomingText, correlation_id: String) {
    let IncomingText { customer_id, reply_token, text, webhook_event_id } = incoming;
    info!(
        event_name = "ingress.line.message_received",
        correlation_id = %correlation_id,
        customer_id = %customer_id,
        webhook_event_id = webhook_event_id.as_deref().unwrap_or("-"),
        "customer message received"
    );

    let message = InboundMessage::new(customer_id.clone(), text).with_correlation_id(&correlation_id);
    let handled = state.runtime.handle_message(message).await;
    let outbound = OutboundMessage::with_choices(&handled.reply.text, &handled.reply.quick_choices);

    match state.replies.reply(&reply_token, &[outbound]).await {
        Ok(()) => info!(
            event_name = "egress.line.reply_sent",
            correlation_id = %correlation_id,
            customer_id = %customer_id,
            failed_turn = handled.failed,
            "reply sent"
        ),
        Err(reply_error) => warn!(
            event_name = "egress.line.reply_failed",
            correlation_id = %correlation_id,
            customer_id = %customer_id,
            error = %reply_error,
            "reply could not be delivered"
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use chatcart_agent::{Collaborators, ConversationRuntime, RuntimeSettings};
    use chatcart_core::audit::InMemoryAuditSink;
    use chatcart_core::catalog::rows::CatalogRows;
    use chatcart_core::catalog::{CatalogSnapshot, CatalogStore, CatalogView};
    use chatcart_core::collaborators::{InMemoryOrderSink, InMemoryStaffNotifier, LiteralToneGenerator};
    use chatcart_core::flows::ConversationEngine;
    use chatcart_core::sessions::InMemorySessionStore;
    use chatcart_db::{connect_with_settings, DbPool};
    use chatcart_line::{sign, InMemoryReplySender, OutboundMessage, SentMessage, SIGNATURE_HEADER};

    use super::{router, AppState};

    pub(crate) const SECRET: &str = "test-channel-secret";
    const CATALOG: &str = include_str!("../../../demos/catalog.toml");

    pub(crate) fn state(catalog: CatalogStore, db_pool: DbPool, replies: InMemoryReplySender) -> AppState {
        let collaborators = Collaborators {
            orders: Arc::new(InMemoryOrderSink::default()),
            notifier: Arc::new(InMemoryStaffNotifier::default()),
            tone: Arc::new(LiteralToneGenerator),
            audit: Arc::new(InMemoryAuditSink::default()),
        };
        let runtime = ConversationRuntime::new(
            ConversationEngine::default(),
            Arc::new(catalog),
            Arc::new(InMemorySessionStore::default()),
            collaborators,
            RuntimeSettings::default(),
        );
        AppState {
            runtime: Arc::new(runtime),
            replies: Arc::new(replies),
            channel_secret: SecretString::from(SECRET.to_owned()),
            db_pool,
        }
    }

    pub(crate) fn demo_catalog() -> CatalogStore {
        let rows = CatalogRows::from_toml(CATALOG).expect("demo catalog parses");
        let snapshot = CatalogSnapshot::from_rows(&rows, Utc::now()).expect("demo catalog valid");
        CatalogStore::new(CatalogView::build(snapshot).expect("view builds"))
    }

    pub(crate) async fn pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool connects")
    }

    fn text_event(user_id: &str, reply_token: &str, text: &str) -> String {
        serde_json::json!({
            "destination": "Ubot",
            "events": [{
                "type": "message",
                "replyToken": reply_token,
                "source": { "type": "user", "userId": user_id },
                "message": { "type": "text", "id": "m-1", "text": text },
                "webhookEventId": "evt-1",
                "timestamp": 1_760_000_000_000_i64
            }]
        })
        .to_string()
    }

    async fn post(app: Router, body: String, signature: Option<String>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method("POST").uri("/callback");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let response = app
            .oneshot(request.body(Body::from(body)).expect("request builds"))
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.expect("body readable");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn signed_text_message_is_answered_through_the_reply_api() {
        let replies = InMemoryReplySender::default();
        let app = router(state(demo_catalog(), pool().await, replies.clone()));
        let body = text_event("U-webhook", "rt-1", "น้ำพริกเห็ด");
        let signature = sign(SECRET.as_bytes(), body.as_bytes()).expect("signs");

        let (status, ack) = post(app, body, Some(signature)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["handled"], 1);
        match replies.sent().as_slice() {
            [SentMessage::Reply { reply_token, messages }] => {
                assert_eq!(reply_token, "rt-1");
                let [OutboundMessage::Text { quick_reply, .. }] = messages.as_slice() else {
                    panic!("expected a single text message, got {messages:?}");
                };
                assert!(quick_reply.is_some());
            }
            other => panic!("expected one reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_replying() {
        let replies = InMemoryReplySender::default();
        let app = router(state(demo_catalog(), pool().await, replies.clone()));
        let body = text_event("U-webhook", "rt-2", "สวัสดี");
        let signature = sign(b"some-other-secret", body.as_bytes()).expect("signs");

        let (status, error) = post(app, body, Some(signature)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error["error"], "invalid signature");
        assert!(replies.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let app = router(state(demo_catalog(), pool().await, InMemoryReplySender::default()));

        let (status, _) = post(app, text_event("U-webhook", "rt-3", "สวัสดี"), None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_bad_request() {
        let app = router(state(demo_catalog(), pool().await, InMemoryReplySender::default()));
        let body = "{\"events\": 42}".to_owned();
        let signature = sign(SECRET.as_bytes(), body.as_bytes()).expect("signs");

        let (status, error) = post(app, body, Some(signature)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], "webhook payload rejected");
        assert!(error["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn verification_ping_without_events_is_acknowledged() {
        let replies = InMemoryReplySender::default();
        let app = router(state(demo_catalog(), pool().await, replies.clone()));
        let body = "{\"destination\":\"Ubot\",\"events\":[]}".to_owned();
        let signature = sign(SECRET.as_bytes(), body.as_bytes()).expect("signs");

        let (status, ack) = post(app, body, Some(signature)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["handled"], 0);
        assert!(replies.sent().is_empty());
    }
}
