//! LINE Messaging API adapters for chatcart
//!
//! - **Signature** (`signature`) - `X-Line-Signature` verification (HMAC-SHA256, base64)
//! - **Webhook** (`webhook`) - inbound event payloads, reduced to customer text messages
//! - **Messages** (`messages`) - text replies with quick-reply buttons
//! - **Client** (`client`) - reply/push API calls and the staff push notifier
//!
//! ```text
//! POST /callback → verify_signature → parse_payload → IncomingText → runtime
//!                                                                  ↓
//!                          ReplySender::reply ← OutboundMessage ← ReplyDirective
//! ```

pub mod client;
pub mod messages;
pub mod signature;
pub mod webhook;

pub use client::{
    InMemoryReplySender, LineClient, LineError, LinePushNotifier, ReplySender, SentMessage,
};
pub use messages::{OutboundMessage, QuickReply};
pub use signature::{sign, verify_signature, SignatureError, SIGNATURE_HEADER};
pub use webhook::{parse_payload, IncomingText, WebhookError, WebhookPayload};
