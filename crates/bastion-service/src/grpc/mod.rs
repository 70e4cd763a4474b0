//! gRPC service implementations for Bastion.
//!
//! This module provides:
//! - `pipeline` - Interceptor chain (audit, stats, authorization) run for every call
//! - `biz_service` - Placeholder business methods (`bastion.Biz`)
//! - `admin_service` - Audit and statistics streams (`bastion.Admin`)
//!
//! # Call flow
//!
//! ```text
//! request → CallContext (consumer metadata, peer) → InterceptorPipeline → handler
//! ```
//!
//! Services never touch the gate, bus or aggregator directly for
//! admission; everything goes through [`InterceptorPipeline`].

pub mod admin_service;
pub mod biz_service;
pub mod pipeline;

pub use admin_service::AdminService;
pub use biz_service::BizService;
pub use pipeline::{AdmittedCall, CallContext, InterceptorPipeline, CONSUMER_METADATA_KEY};
