use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{info, warn};

use chatcart_core::collaborators::{StaffMessage, StaffNotifier};
use chatcart_core::errors::ApplicationError;

use crate::messages::{OutboundMessage, PushRequest, ReplyRequest};

#[derive(Debug, Error)]
pub enum LineError {
    #[error("LINE API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LINE API returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<LineError> for ApplicationError {
    fn from(error: LineError) -> Self {
        ApplicationError::Integration(error.to_string())
    }
}

#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn reply(&self, reply_token: &str, messages: &[OutboundMessage])
        -> Result<(), LineError>;
    async fn push(&self, to: &str, messages: &[OutboundMessage]) -> Result<(), LineError>;
}

pub struct LineClient {
    client: Client,
    api_base_url: String,
    access_token: SecretString,
}

impl LineClient {
    pub fn new(
        api_base_url: impl Into<String>,
        access_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, LineError> {
        let client = Client::builder().timeout(timeout).build()?;
        let api_base_url = api_base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { client, api_base_url, access_token })
    }

    async fn post<T: serde::Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), LineError> {
        let response = self
            .client
            .post(format!("{}{path}", self.api_base_url))
            .bearer_auth(self.access_token.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(LineError::Status { status: status.as_u16(), body })
    }
}

#[async_trait]
impl ReplySender for LineClient {
    async fn reply(
        &self,
        reply_token: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), LineError> {
        self.post("/v2/bot/message/reply", &ReplyRequest { reply_token, messages }).await
    }

    async fn push(&self, to: &str, messages: &[OutboundMessage]) -> Result<(), LineError> {
        self.post("/v2/bot/message/push", &PushRequest { to, messages }).await
    }
}

/// Pushes staff messages to the configured LINE user or group. Without a
/// target the message is only logged.
pub struct LinePushNotifier {
    sender: Arc<dyn ReplySender>,
    target: Option<String>,
}

impl LinePushNotifier {
    pub fn new(sender: Arc<dyn ReplySender>, target: Option<String>) -> Self {
        Self { sender, target }
    }
}

#[async_trait]
impl StaffNotifier for LinePushNotifier {
    async fn notify(&self, message: StaffMessage) -> Result<(), ApplicationError> {
        let Some(target) = self.target.as_deref() else {
            warn!(
                event_name = "egress.line.staff_push_skipped",
                staff_message = %message.text(),
                "no staff target configured"
            );
            return Ok(());
        };

        self.sender.push(target, &[OutboundMessage::text(message.text())]).await?;
        info!(event_name = "egress.line.staff_pushed", "staff notification sent");
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentMessage {
    Reply { reply_token: String, messages: Vec<OutboundMessage> },
    Push { to: String, messages: Vec<OutboundMessage> },
}

/// Records outgoing calls instead of sending them.
#[derive(Clone, Default)]
pub struct InMemoryReplySender {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl InMemoryReplySender {
    pub fn sent(&self) -> Vec<SentMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, message: SentMessage) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
    }
}

#[async_trait]
impl ReplySender for InMemoryReplySender {
    async fn reply(
        &self,
        reply_token: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), LineError> {
        self.record(SentMessage::Reply {
            reply_token: reply_token.to_owned(),
            messages: messages.to_vec(),
        });
        Ok(())
    }

    async fn push(&self, to: &str, messages: &[OutboundMessage]) -> Result<(), LineError> {
        self.record(SentMessage::Push { to: to.to_owned(), messages: messages.to_vec() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chatcart_core::collaborators::{StaffMessage, StaffNotifier};
    use chatcart_core::domain::order::OrderId;
    use chatcart_core::domain::session::CustomerId;

    use super::{InMemoryReplySender, LinePushNotifier, SentMessage};

    fn order_placed() -> StaffMessage {
        StaffMessage::OrderPlaced {
            order_id: OrderId("ORD-20261014-0001".to_owned()),
            customer_id: CustomerId("U1".to_owned()),
            summary: "ออเดอร์ใหม่ ORD-20261014-0001".to_owned(),
        }
    }

    #[tokio::test]
    async fn staff_messages_are_pushed_to_the_target() {
        let sender = InMemoryReplySender::default();
        let notifier = LinePushNotifier::new(Arc::new(sender.clone()), Some("C-staff".to_owned()));

        notifier.notify(order_placed()).await.expect("notify");

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        let SentMessage::Push { to, messages } = &sent[0] else {
            panic!("expected a push, got {sent:?}");
        };
        assert_eq!(to, "C-staff");
        assert_eq!(messages[0].body(), "ออเดอร์ใหม่ ORD-20261014-0001");
    }

    #[tokio::test]
    async fn missing_target_only_logs() {
        let sender = InMemoryReplySender::default();
        let notifier = LinePushNotifier::new(Arc::new(sender.clone()), None);

        notifier.notify(order_placed()).await.expect("notify");

        assert!(sender.sent().is_empty());
    }
}
