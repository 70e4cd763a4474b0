//! # Bastion Test Utilities
//!
//! Shared test utilities for the Bastion service.
//!
//! This crate provides:
//! - Server test harness (`TestBastionServer` for E2E tests)
//! - Client helpers that attach the `consumer` metadata to requests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bastion_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestBastionServer::spawn(r#"{"alice": ["/bastion.Biz/*"]}"#).await?;
//!     let mut biz = server.biz_client().await?;
//!
//!     let response = biz.add(as_consumer("alice", Nothing::default())).await?;
//!     assert!(response.into_inner().dummy);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

// Re-export commonly used items
pub use server_harness::*;
