use serde::Serialize;

pub const MAX_QUICK_REPLY_ITEMS: usize = 13;
pub const MAX_QUICK_REPLY_LABEL_CHARS: usize = 20;
pub const MAX_TEXT_CHARS: usize = 5000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuickReplyAction {
    /// Tapping sends `text` back as if the customer typed it.
    Message { label: String, text: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuickReplyItem {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub action: QuickReplyAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuickReply {
    pub items: Vec<QuickReplyItem>,
}

impl QuickReply {
    /// Blank choices are dropped and the list is cut at the platform limit.
    pub fn from_choices(choices: &[String]) -> Option<Self> {
        let items: Vec<QuickReplyItem> = choices
            .iter()
            .map(|choice| choice.trim())
            .filter(|choice| !choice.is_empty())
            .take(MAX_QUICK_REPLY_ITEMS)
            .map(|choice| QuickReplyItem {
                kind: "action",
                action: QuickReplyAction::Message {
                    label: truncate_chars(choice, MAX_QUICK_REPLY_LABEL_CHARS),
                    text: choice.to_owned(),
                },
            })
            .collect();
        (!items.is_empty()).then_some(Self { items })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text {
        text: String,
        #[serde(rename = "quickReply", skip_serializing_if = "Option::is_none")]
        quick_reply: Option<QuickReply>,
    },
}

impl OutboundMessage {
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::Text { text: truncate_chars(text.as_ref(), MAX_TEXT_CHARS), quick_reply: None }
    }

    pub fn with_choices(text: impl AsRef<str>, choices: &[String]) -> Self {
        Self::Text {
            text: truncate_chars(text.as_ref(), MAX_TEXT_CHARS),
            quick_reply: QuickReply::from_choices(choices),
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Text { text, .. } => text,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReplyRequest<'a> {
    pub reply_token: &'a str,
    pub messages: &'a [OutboundMessage],
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct PushRequest<'a> {
    pub to: &'a str,
    pub messages: &'a [OutboundMessage],
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => value[..index].to_owned(),
        None => value.to_owned(),
    }
}
