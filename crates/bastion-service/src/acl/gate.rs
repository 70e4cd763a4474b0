//! Authorization gate: may this consumer call this method?

use super::table::Acl;
use crate::errors::BastionError;
use common::types::ConsumerId;
use tracing::trace;

/// Why a call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No consumer identity could be extracted from the call.
    MissingConsumer,
    /// The consumer has no ACL entry.
    UnknownConsumer,
    /// No allowed pattern of the consumer matches the method.
    MethodNotPermitted,
}

impl DenyReason {
    /// Short reason string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MissingConsumer => "missing consumer",
            DenyReason::UnknownConsumer => "unknown consumer",
            DenyReason::MethodNotPermitted => "method not permitted",
        }
    }

    /// Convert into the error returned to the caller.
    #[must_use]
    pub fn into_error(self, consumer: Option<&ConsumerId>, method: &str) -> BastionError {
        let consumer = consumer.map(ToString::to_string).unwrap_or_default();
        match self {
            DenyReason::MissingConsumer => BastionError::MissingConsumer,
            DenyReason::UnknownConsumer => BastionError::UnknownConsumer(consumer),
            DenyReason::MethodNotPermitted => BastionError::MethodNotPermitted {
                consumer,
                method: method.to_string(),
            },
        }
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

impl Decision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Answers allow/deny over an immutable [`Acl`].
///
/// Checks are pure reads, so a single gate can be shared behind an `Arc`
/// by every in-flight call.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    acl: Acl,
}

impl AuthorizationGate {
    #[must_use]
    pub fn new(acl: Acl) -> Self {
        Self { acl }
    }

    /// The table this gate consults.
    #[must_use]
    pub fn acl(&self) -> &Acl {
        &self.acl
    }

    /// Decide whether `consumer` may invoke `method`.
    #[must_use]
    pub fn authorize(&self, consumer: Option<&ConsumerId>, method: &str) -> Decision {
        let Some(consumer) = consumer else {
            return Decision::Denied(DenyReason::MissingConsumer);
        };

        let Some(patterns) = self.acl.patterns(consumer.as_str()) else {
            return Decision::Denied(DenyReason::UnknownConsumer);
        };

        match patterns.iter().find(|pattern| pattern.matches(method)) {
            Some(pattern) => {
                trace!(
                    target: "bastion.acl",
                    consumer = %consumer,
                    method = %method,
                    pattern = %pattern.as_str(),
                    "Call allowed"
                );
                Decision::Allowed
            }
            None => Decision::Denied(DenyReason::MethodNotPermitted),
        }
    }
}
