//! Access control list: consumer → allowed method patterns.
//!
//! Loaded once at startup from a JSON object and never mutated afterwards,
//! so it can be shared across calls without synchronization.

use super::matcher::{PathPattern, PatternError};
use common::types::ConsumerId;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Errors while loading an ACL definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    #[error("ACL is not a JSON object of string arrays: {0}")]
    Json(String),

    #[error("ACL contains an empty consumer name")]
    EmptyConsumer,

    #[error("Invalid pattern {pattern:?} for consumer {consumer}: {reason}")]
    InvalidPattern {
        consumer: String,
        pattern: String,
        reason: PatternError,
    },
}

/// Immutable consumer → patterns table.
#[derive(Debug, Clone, Default)]
pub struct Acl {
    entries: HashMap<ConsumerId, Vec<PathPattern>>,
}

impl Acl {
    /// Parse an ACL such as
    /// `{"logger": ["/bastion.Admin/Logging"], "biz_admin": ["/bastion.Biz/*"]}`.
    ///
    /// # Errors
    ///
    /// Returns [`AclError`] if the document is not an object of string
    /// arrays, a consumer name is empty, or any pattern is malformed.
    pub fn from_json(json: &str) -> Result<Self, AclError> {
        let raw: HashMap<String, Vec<String>> =
            serde_json::from_str(json).map_err(|e| AclError::Json(e.to_string()))?;
        Self::from_map(raw)
    }

    /// Build an ACL from already-decoded entries.
    ///
    /// # Errors
    ///
    /// Same validation as [`Acl::from_json`].
    pub fn from_map(raw: HashMap<String, Vec<String>>) -> Result<Self, AclError> {
        let mut entries = HashMap::with_capacity(raw.len());

        for (consumer, patterns) in raw {
            let id = ConsumerId::new(consumer.as_str()).map_err(|_| AclError::EmptyConsumer)?;

            let compiled = patterns
                .iter()
                .map(|pattern| {
                    PathPattern::parse(pattern).map_err(|reason| AclError::InvalidPattern {
                        consumer: consumer.clone(),
                        pattern: pattern.clone(),
                        reason,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            debug!(
                target: "bastion.acl",
                consumer = %id,
                patterns = compiled.len(),
                "Loaded ACL entry"
            );
            entries.insert(id, compiled);
        }

        Ok(Self { entries })
    }

    /// Allowed patterns for `consumer`, in the order they were declared.
    #[must_use]
    pub fn patterns(&self, consumer: &str) -> Option<&[PathPattern]> {
        self.entries.get(consumer).map(Vec::as_slice)
    }

    /// Number of consumers in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no consumer is allowed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ACL_JSON: &str = r#"{
        "logger": ["/bastion.Admin/Logging"],
        "stat": ["/bastion.Admin/Statistics"],
        "biz_user": ["/bastion.Biz/Check", "/bastion.Biz/Add"],
        "biz_admin": ["/bastion.Biz/*"]
    }"#;

    #[test]
    fn test_from_json_loads_all_consumers() {
        let acl = Acl::from_json(ACL_JSON).unwrap();
        assert_eq!(acl.len(), 4);

        let patterns = acl.patterns("biz_user").unwrap();
        let raw: Vec<&str> = patterns.iter().map(PathPattern::as_str).collect();
        assert_eq!(raw, vec!["/bastion.Biz/Check", "/bastion.Biz/Add"]);

        assert!(acl.patterns("nobody").is_none());
    }

    #[test]
    fn test_empty_object_is_valid() {
        let acl = Acl::from_json("{}").unwrap();
        assert!(acl.is_empty());
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(matches!(Acl::from_json("[]"), Err(AclError::Json(_))));
        assert!(matches!(Acl::from_json("not json"), Err(AclError::Json(_))));
        assert!(matches!(
            Acl::from_json(r#"{"logger": "/bastion.Admin/Logging"}"#),
            Err(AclError::Json(_))
        ));
    }

    #[test]
    fn test_rejects_empty_consumer() {
        let result = Acl::from_json(r#"{"": ["/bastion.Biz/*"]}"#);
        assert_eq!(result.unwrap_err(), AclError::EmptyConsumer);
    }

    #[test]
    fn test_rejects_bad_pattern_with_context() {
        let result = Acl::from_json(r#"{"biz": ["bastion.Biz/Add"]}"#);
        assert_eq!(
            result.unwrap_err(),
            AclError::InvalidPattern {
                consumer: "biz".to_string(),
                pattern: "bastion.Biz/Add".to_string(),
                reason: PatternError::NotAbsolute,
            }
        );
    }
}
