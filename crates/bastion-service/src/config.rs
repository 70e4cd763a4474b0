//! Bastion configuration.
//!
//! Configuration is loaded from environment variables. The access control
//! list is redacted in Debug output.

use crate::acl::Acl;
use common::config::{ObservabilityConfig, DEFAULT_LOG_FILTER};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default gRPC bind address.
pub const DEFAULT_GRPC_BIND_ADDRESS: &str = "0.0.0.0:50061";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8091";

/// Default per-subscriber audit event buffer.
pub const DEFAULT_EVENT_BUFFER: usize = crate::events::DEFAULT_EVENT_BUFFER;

/// Default upper bound on a requested statistics interval, in seconds.
pub const DEFAULT_MAX_STAT_INTERVAL_SECONDS: u64 = 3600;

/// Bastion configuration.
#[derive(Clone)]
pub struct Config {
    /// gRPC server bind address (default: "0.0.0.0:50061").
    pub grpc_bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8091").
    pub health_bind_address: String,

    /// Consumer → allowed patterns, from `BASTION_ACL` or `BASTION_ACL_PATH`.
    pub acl: Acl,

    /// Audit events buffered per Logging subscriber (default: 20).
    pub event_buffer: usize,

    /// Largest interval a Statistics subscriber may request (default: 1h).
    pub max_stat_interval: Duration,

    /// Log filter and format.
    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts the ACL.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("grpc_bind_address", &self.grpc_bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("acl", &format_args!("[{} consumers]", self.acl.len()))
            .field("event_buffer", &self.event_buffer)
            .field("max_stat_interval", &self.max_stat_interval)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the ACL is missing or any value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the ACL is missing or any value is invalid.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let acl = load_acl(vars)?;

        let grpc_bind_address = vars
            .get("BASTION_GRPC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_GRPC_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("BASTION_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let event_buffer = match vars.get("BASTION_EVENT_BUFFER") {
            Some(value) => match value.parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::InvalidValue(format!(
                        "BASTION_EVENT_BUFFER must be a positive integer, got '{value}'"
                    )))
                }
                Ok(n) => n,
            },
            None => DEFAULT_EVENT_BUFFER,
        };

        let max_stat_interval_seconds = match vars.get("BASTION_MAX_STAT_INTERVAL_SECONDS") {
            Some(value) => match value.parse::<u64>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::InvalidValue(format!(
                        "BASTION_MAX_STAT_INTERVAL_SECONDS must be a positive integer, got '{value}'"
                    )))
                }
                Ok(n) => n,
            },
            None => DEFAULT_MAX_STAT_INTERVAL_SECONDS,
        };

        let json_logs = vars
            .get("BASTION_LOG_JSON")
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        let log_filter = vars
            .get("BASTION_LOG_FILTER")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Config {
            grpc_bind_address,
            health_bind_address,
            acl,
            event_buffer,
            max_stat_interval: Duration::from_secs(max_stat_interval_seconds),
            observability: ObservabilityConfig {
                log_filter,
                json_logs,
            },
        })
    }
}

/// Read the ACL from exactly one of `BASTION_ACL` (inline JSON) or
/// `BASTION_ACL_PATH` (file).
fn load_acl(vars: &HashMap<String, String>) -> Result<Acl, ConfigError> {
    let json = match (vars.get("BASTION_ACL"), vars.get("BASTION_ACL_PATH")) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::InvalidValue(
                "set only one of BASTION_ACL and BASTION_ACL_PATH".to_string(),
            ))
        }
        (Some(inline), None) => inline.clone(),
        (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidValue(format!("cannot read BASTION_ACL_PATH '{path}': {e}"))
        })?,
        (None, None) => {
            return Err(ConfigError::MissingEnvVar(
                "BASTION_ACL or BASTION_ACL_PATH".to_string(),
            ))
        }
    };

    Acl::from_json(&json).map_err(|e| ConfigError::InvalidValue(format!("invalid ACL: {e}")))
}
