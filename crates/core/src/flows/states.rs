use serde::{Deserialize, Serialize};

use crate::domain::order::OrderRecord;
use crate::domain::session::{Session, Stage};
use crate::intent::Intent;

/// Work the message-handling boundary performs after the new session is committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideEffect {
    PersistOrder(OrderRecord),
    NotifyStaff { summary: String },
}

/// A reply to be phrased by the tone collaborator. `fallback` is sent verbatim
/// when the collaborator fails or times out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneRequest {
    pub instruction: String,
    pub context: Option<String>,
    pub fallback: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyText {
    Literal(String),
    Tone(ToneRequest),
}

impl ReplyText {
    /// The text sent when no rewriting happens.
    pub fn literal(&self) -> &str {
        match self {
            Self::Literal(text) => text,
            Self::Tone(request) => &request.fallback,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyDirective {
    pub text: ReplyText,
    pub quick_choices: Vec<String>,
}

impl ReplyDirective {
    pub fn literal(text: impl Into<String>) -> Self {
        Self { text: ReplyText::Literal(text.into()), quick_choices: Vec::new() }
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.quick_choices = choices;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub from: Stage,
    pub to: Stage,
    pub intent: Intent,
    pub reply: ReplyDirective,
    pub effects: Vec<SideEffect>,
}

impl TurnOutcome {
    pub fn order(&self) -> Option<&OrderRecord> {
        self.effects.iter().find_map(|effect| match effect {
            SideEffect::PersistOrder(order) => Some(order),
            SideEffect::NotifyStaff { .. } => None,
        })
    }
}

/// Result of one message: the session to commit plus what to say and do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub session: Session,
    pub outcome: TurnOutcome,
}
