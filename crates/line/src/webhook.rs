use serde::Deserialize;
use thiserror::Error;

use chatcart_core::domain::session::CustomerId;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook body is not a valid LINE payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebhookEvent {
    Message(MessageEvent),
    Follow(SourceEvent),
    Unfollow(SourceEvent),
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub reply_token: Option<String>,
    pub source: Option<EventSource>,
    pub message: MessageContent,
    pub webhook_event_id: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEvent {
    pub source: Option<EventSource>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventSource {
    #[serde(rename_all = "camelCase")]
    User { user_id: String },
    #[serde(rename_all = "camelCase")]
    Group { group_id: String, user_id: Option<String> },
    #[serde(rename_all = "camelCase")]
    Room { room_id: String, user_id: Option<String> },
}

impl EventSource {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User { user_id } => Some(user_id),
            Self::Group { user_id, .. } | Self::Room { user_id, .. } => user_id.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { id: String, text: String },
    #[serde(other)]
    Other,
}

/// One customer text message, the only event kind the conversation consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingText {
    pub customer_id: CustomerId,
    pub reply_token: String,
    pub text: String,
    pub webhook_event_id: Option<String>,
}

impl WebhookPayload {
    /// Text messages in delivery order. Events without a user or reply token
    /// cannot be answered and are skipped.
    pub fn text_messages(&self) -> Vec<IncomingText> {
        self.events
            .iter()
            .filter_map(|event| {
                let WebhookEvent::Message(message) = event else {
                    return None;
                };
                let MessageContent::Text { text, .. } = &message.message else {
                    return None;
                };
                let user_id = message.source.as_ref()?.user_id()?;
                let reply_token = message.reply_token.as_ref()?;
                Some(IncomingText {
                    customer_id: CustomerId(user_id.to_owned()),
                    reply_token: reply_token.clone(),
                    text: text.clone(),
                    webhook_event_id: message.webhook_event_id.clone(),
                })
            })
            .collect()
    }
}

pub fn parse_payload(body: &[u8]) -> Result<WebhookPayload, WebhookError> {
    Ok(serde_json::from_slice(body)?)
}
