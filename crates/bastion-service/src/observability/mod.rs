//! Observability for Bastion: metrics and health probes.
//!
//! - [`metrics`] - Prometheus counters and gauges for calls, events and stat windows
//! - [`health`] - `/health`, `/ready` and `/metrics` HTTP endpoints

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
