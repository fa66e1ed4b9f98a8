pub mod engine;
pub mod replies;
pub mod states;

pub use engine::{ConversationEngine, ConversationSettings, FlowError, TurnClock};
pub use states::{ReplyDirective, ReplyText, SideEffect, ToneRequest, Turn, TurnOutcome};
