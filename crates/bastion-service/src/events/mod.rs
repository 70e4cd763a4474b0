//! Live audit feed of intercepted calls.

pub mod bus;

pub use bus::{AuditEvent, EventBus, PublishReport, Subscription, DEFAULT_EVENT_BUFFER};
