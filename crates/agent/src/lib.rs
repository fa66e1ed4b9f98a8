//! Message-handling runtime for chatcart
//!
//! Wraps the pure conversation engine with everything a live channel needs:
//! - **Runtime** (`runtime`) - per-customer serialization, commit-on-success,
//!   apology fallback, reply phrasing, background order persistence and staff pushes
//! - **Tone** (`llm`) - OpenAI-compatible tone generator, or a disabled one
//! - **Maintenance** (`maintenance`) - catalog refresh and idle-session eviction passes
//!
//! # Safety Principle
//!
//! The tone generator only rephrases. Prices, discounts, cart contents and
//! stage transitions are decided by the deterministic core; a failed or slow
//! tone call always degrades to the literal text.

pub mod llm;
pub mod maintenance;
pub mod runtime;

pub use llm::{tone_generator_from_config, DisabledToneGenerator, OpenAiToneGenerator};
pub use maintenance::{evict_idle_sessions, refresh_catalog};
pub use runtime::{
    Collaborators, ConversationRuntime, HandledMessage, InboundMessage, RuntimeReply,
    RuntimeSettings,
};
