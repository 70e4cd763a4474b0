//! gRPC server wiring.
//!
//! Builds the ACL gate, event bus and stats aggregator from [`Config`],
//! composes them into one [`InterceptorPipeline`] and serves the `Biz` and
//! `Admin` services on a bound listener until the shutdown token fires.

use crate::acl::AuthorizationGate;
use crate::config::Config;
use crate::errors::BastionError;
use crate::events::EventBus;
use crate::grpc::{AdminService, BizService, InterceptorPipeline};
use crate::stats::StatsAggregator;
use proto_gen::bastion::admin_server::AdminServer;
use proto_gen::bastion::biz_server::BizServer;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Build the interceptor pipeline described by `config`.
///
/// Statistics timers stop when `shutdown` is cancelled.
#[must_use]
pub fn build_pipeline(config: &Config, shutdown: &CancellationToken) -> InterceptorPipeline {
    InterceptorPipeline::new(
        Arc::new(AuthorizationGate::new(config.acl.clone())),
        EventBus::new(config.event_buffer),
        StatsAggregator::new(config.max_stat_interval, shutdown.child_token()),
    )
}

/// Serve Bastion on `listener` until `shutdown` is cancelled.
///
/// Cancelling `shutdown` also ends every open Logging and Statistics stream,
/// so the graceful drain does not wait on long-lived streams.
///
/// # Errors
///
/// Returns [`BastionError::Transport`] if the gRPC server fails.
pub async fn serve(
    config: Config,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<(), BastionError> {
    let pipeline = build_pipeline(&config, &shutdown);
    serve_pipeline(pipeline, listener, shutdown).await
}

/// Serve an already built pipeline on `listener` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns [`BastionError::Transport`] if the gRPC server fails.
pub async fn serve_pipeline(
    pipeline: InterceptorPipeline,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<(), BastionError> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| BastionError::Transport(format!("listener has no local address: {e}")))?;

    let biz = BizService::new(pipeline.clone());
    let admin = AdminService::new(pipeline, shutdown.child_token());

    info!(target: "bastion.server", addr = %local_addr, "gRPC server starting");

    let signal = async move {
        shutdown.cancelled().await;
        info!(target: "bastion.server", "gRPC server shutting down");
    };

    tonic::transport::Server::builder()
        .add_service(BizServer::new(biz))
        .add_service(AdminServer::new(admin))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
        .await
        .map_err(|e| {
            error!(target: "bastion.server", error = %e, "gRPC server failed");
            BastionError::Transport(e.to_string())
        })
}
