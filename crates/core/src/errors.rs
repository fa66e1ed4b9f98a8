use thiserror::Error;

use crate::{catalog::CatalogError, flows::FlowError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("template rendering failed: {0}")]
    Template(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

/// How a failure surfaces at the webhook boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// The caller sent something we will never accept; LINE should not redeliver it.
    Rejected,
    /// A dependency is down or slow; a redelivery may succeed.
    Unavailable,
    Internal,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{} failure: {message}", .class.as_str())]
pub struct InterfaceError {
    pub class: FailureClass,
    /// Operator-facing detail; never shown to the customer or echoed to LINE.
    pub message: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn rejected(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Rejected,
            message: message.into(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self.class {
            FailureClass::Rejected => "webhook payload rejected",
            FailureClass::Unavailable => "shop bot is temporarily unavailable",
            FailureClass::Internal => "shop bot failed to handle the event",
        }
    }
}

impl ApplicationError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Domain(DomainError::Catalog(_)) | Self::Domain(DomainError::InvariantViolation(_)) => {
                FailureClass::Rejected
            }
            Self::Domain(DomainError::Flow(_))
            | Self::Domain(DomainError::Template(_))
            | Self::Configuration(_) => FailureClass::Internal,
            Self::Persistence(_) | Self::Integration(_) | Self::Timeout { .. } => {
                FailureClass::Unavailable
            }
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError {
            class: self.class(),
            message: self.to_string(),
            correlation_id: correlation_id.into(),
        }
    }
}
