//! Bastion Service Library
//!
//! Bastion is a small gRPC service whose interesting part is the layer
//! wrapped around every call:
//!
//! - An authorization gate deciding whether a consumer may call a method
//! - A live audit feed streaming every call to Logging subscribers
//! - Windowed per-method and per-consumer call statistics
//!
//! # Architecture
//!
//! ```text
//! tonic call
//!   └── InterceptorPipeline
//!       ├── EventBus          (publish audit event)
//!       ├── StatsAggregator   (record call in every open window)
//!       └── AuthorizationGate (allow / deny)
//!           └── BizService | AdminService
//! ```
//!
//! The ACL, bus and aggregator are built once at startup and shared by
//! handle; there is no global state.
//!
//! # Modules
//!
//! - [`acl`] - ACL table, path pattern matching and the authorization gate
//! - [`events`] - Audit event bus
//! - [`stats`] - Statistics windows
//! - [`grpc`] - Interceptor pipeline and service implementations
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types mapped to gRPC status codes
//! - [`observability`] - Metrics and health endpoints
//! - [`server`] - Server wiring and lifecycle

pub mod acl;
pub mod config;
pub mod errors;
pub mod events;
pub mod grpc;
pub mod observability;
pub mod server;
pub mod stats;
