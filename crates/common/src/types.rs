//! Common data types for Bastion components.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

/// Error returned when a string cannot be used as a consumer identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsumerIdError {
    /// The identity was empty or whitespace only.
    #[error("consumer identity is empty")]
    Empty,
}

/// Identity of the caller attached to every call.
///
/// The value is opaque: Bastion never interprets it beyond equality, it only
/// looks it up in the access control list. Identities are trusted as given,
/// verifying them is the job of whatever sits in front of the service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Create a consumer identity, rejecting empty values.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerIdError::Empty`] if `value` is empty or whitespace only.
    pub fn new(value: impl Into<String>) -> Result<Self, ConsumerIdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ConsumerIdError::Empty);
        }
        Ok(Self(value))
    }

    /// Borrow the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ConsumerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConsumerId {
    type Error = ConsumerIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ConsumerId {
    type Error = ConsumerIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConsumerId> for String {
    fn from(id: ConsumerId) -> Self {
        id.0
    }
}
