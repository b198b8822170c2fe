//! Services module for business logic and integrations

pub mod click_processor;
pub mod content_sync;
pub mod entitlement;
pub mod notification;
pub mod session;

pub use self::click_processor::ClickProcessor;
pub use self::entitlement::{EntitlementStore, EntitlementUpdater};
pub use self::notification::{HttpNotifier, PaymentNotifier};
