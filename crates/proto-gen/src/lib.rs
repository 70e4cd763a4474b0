//! Generated gRPC code for the Bastion service.
//!
//! Message types are declared here with prost derives; the `Biz` and `Admin`
//! service stubs (client and server) are generated by `build.rs`.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)] // Generated code has various doc formatting

// Re-export prost traits for convenience
pub use prost::Message;

pub mod bastion {
    //! Messages and services of the `bastion` package.

    use std::collections::HashMap;

    /// Empty request/response placeholder.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Nothing {
        #[prost(bool, tag = "1")]
        pub dummy: bool,
    }

    /// Audit record of one intercepted call.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Event {
        /// Unix timestamp (seconds) at which the call was intercepted.
        #[prost(int64, tag = "1")]
        pub timestamp: i64,
        #[prost(string, tag = "2")]
        pub consumer: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub method: ::prost::alloc::string::String,
        /// Peer address of the caller (`ip:port`).
        #[prost(string, tag = "4")]
        pub host: ::prost::alloc::string::String,
    }

    /// Call counters accumulated over one statistics interval.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Stat {
        /// Unix timestamp (seconds) at which the window was emitted.
        #[prost(int64, tag = "1")]
        pub timestamp: i64,
        #[prost(map = "string, uint64", tag = "2")]
        pub by_method: HashMap<::prost::alloc::string::String, u64>,
        #[prost(map = "string, uint64", tag = "3")]
        pub by_consumer: HashMap<::prost::alloc::string::String, u64>,
    }

    /// Emission period requested by a statistics subscriber.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StatInterval {
        #[prost(uint64, tag = "1")]
        pub interval_seconds: u64,
    }

    include!(concat!(env!("OUT_DIR"), "/bastion.Biz.rs"));
    include!(concat!(env!("OUT_DIR"), "/bastion.Admin.rs"));
}

/// Fully qualified gRPC method paths, as seen by interceptors and ACLs.
pub mod paths {
    pub const BIZ_CHECK: &str = "/bastion.Biz/Check";
    pub const BIZ_ADD: &str = "/bastion.Biz/Add";
    pub const BIZ_TEST: &str = "/bastion.Biz/Test";
    pub const ADMIN_LOGGING: &str = "/bastion.Admin/Logging";
    pub const ADMIN_STATISTICS: &str = "/bastion.Admin/Statistics";
}
