pub mod audit;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod intent;
pub mod orders;
pub mod pricing;
pub mod sessions;
pub mod template;
pub mod text;

pub use audit::{AuditContext, AuditEvent, AuditSink};
pub use catalog::{CatalogError, CatalogSnapshot, CatalogSource, CatalogStore, CatalogView};
pub use collaborators::{OrderSink, StaffMessage, StaffNotifier, ToneGenerator};
pub use domain::cart::{Cart, CartItem};
pub use domain::order::{OrderId, OrderRecord, OrderStatus};
pub use domain::product::{Product, ProductCode};
pub use domain::promotion::{Promotion, PromotionKind};
pub use domain::session::{CustomerId, Session, Stage};
pub use errors::{ApplicationError, DomainError, FailureClass, InterfaceError};
pub use flows::{ConversationEngine, Turn, TurnClock, TurnOutcome};
pub use intent::{Intent, IntentClassifier};
pub use pricing::{DeterministicPricingEngine, PricingEngine, PromotionResult};
pub use sessions::{InMemorySessionStore, SessionLease, SessionStore};
