//! Access control for Bastion calls.
//!
//! - [`matcher`] - `/`-segment pattern matching with `*` wildcards
//! - [`table`] - the consumer → patterns table loaded from JSON
//! - [`gate`] - allow/deny decisions over the table

pub mod gate;
pub mod matcher;
pub mod table;

pub use gate::{AuthorizationGate, Decision, DenyReason};
pub use matcher::{matches, PathPattern, PatternError};
pub use table::{Acl, AclError};
