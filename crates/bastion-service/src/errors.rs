//! Bastion error types.
//!
//! Every error maps to a gRPC status code. Call-level failures (identity,
//! authorization, stream parameters) surface as client errors so callers can
//! tell "you are not allowed" from "the server is broken". Internal details
//! are logged server-side but not exposed to clients.

use thiserror::Error;
use tonic::{Code, Status};

/// Bastion error type.
///
/// Maps to gRPC status codes:
/// - `MissingConsumer`, `UnknownConsumer`, `PeerUnavailable`: `UNAUTHENTICATED`
/// - `MethodNotPermitted`, `InvalidInterval`: `PERMISSION_DENIED`
/// - `AlreadySubscribed`: `ALREADY_EXISTS`
/// - `Config`, `Transport`: `INTERNAL` (startup only, never returned to a call)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BastionError {
    /// The `consumer` metadata key was absent or empty.
    #[error("Missing consumer")]
    MissingConsumer,

    /// The consumer is not present in the access control list.
    #[error("Unknown consumer: {0}")]
    UnknownConsumer(String),

    /// None of the consumer's allowed patterns match the called method.
    #[error("Method not permitted: {consumer} may not call {method}")]
    MethodNotPermitted { consumer: String, method: String },

    /// The transport did not report a peer address for the call.
    #[error("Peer address unavailable")]
    PeerUnavailable,

    /// Requested statistics interval is zero or above the configured maximum.
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// The consumer already holds an open stream of this kind.
    #[error("Already subscribed: {0}")]
    AlreadySubscribed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// gRPC transport error (bind, serve).
    #[error("Transport error: {0}")]
    Transport(String),
}

impl BastionError {
    /// Returns the gRPC status code for this error.
    #[must_use]
    pub fn status_code(&self) -> Code {
        match self {
            BastionError::MissingConsumer
            | BastionError::UnknownConsumer(_)
            | BastionError::PeerUnavailable => Code::Unauthenticated,
            BastionError::MethodNotPermitted { .. } | BastionError::InvalidInterval(_) => {
                Code::PermissionDenied
            }
            BastionError::AlreadySubscribed(_) => Code::AlreadyExists,
            BastionError::Config(_) | BastionError::Transport(_) => Code::Internal,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            BastionError::MissingConsumer => "Missing consumer".to_string(),
            BastionError::UnknownConsumer(_) => "Unknown consumer".to_string(),
            BastionError::MethodNotPermitted { .. } => "Method not permitted".to_string(),
            BastionError::PeerUnavailable => "Peer address unavailable".to_string(),
            BastionError::InvalidInterval(reason) => format!("Invalid interval: {reason}"),
            BastionError::AlreadySubscribed(_) => {
                "A stream of this kind is already open for this consumer".to_string()
            }
            BastionError::Config(_) | BastionError::Transport(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

impl From<BastionError> for Status {
    fn from(err: BastionError) -> Self {
        Status::new(err.status_code(), err.client_message())
    }
}
