//! Interceptor pipeline wrapped around every Bastion call.
//!
//! The pipeline composes the [`AuthorizationGate`], the [`EventBus`] and the
//! [`StatsAggregator`]. Service methods build a [`CallContext`] from the
//! incoming request and hand their business logic to [`InterceptorPipeline::unary`]
//! or [`InterceptorPipeline::streaming`], which only run it once the call is
//! admitted.
//!
//! # Call order
//!
//! ```text
//! unary:     extract → publish event → record stats → authorize → handler
//! streaming: extract → publish event → authorize → record stats → handler
//! ```
//!
//! Calls without a consumer identity are rejected before anything is
//! published or counted. Denied calls are still audited; denied unary calls
//! are also counted in the open statistics windows.

use crate::acl::{AuthorizationGate, Decision};
use crate::errors::BastionError;
use crate::events::{AuditEvent, EventBus};
use crate::observability::metrics;
use crate::stats::StatsAggregator;
use common::types::ConsumerId;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::{Request, Status};
use tracing::{debug, trace};

/// Metadata key carrying the caller's consumer identity.
pub const CONSUMER_METADATA_KEY: &str = "consumer";

/// What the pipeline knows about a call before admitting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Fully qualified method path, e.g. `/bastion.Biz/Add`.
    pub method: String,
    pub consumer: Option<ConsumerId>,
    pub peer: Option<SocketAddr>,
}

impl CallContext {
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        consumer: Option<ConsumerId>,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            method: method.into(),
            consumer,
            peer,
        }
    }

    /// Extract the consumer identity and peer address of `request`.
    ///
    /// A `consumer` value that is missing, not valid ASCII or blank yields no
    /// consumer.
    #[must_use]
    pub fn from_request<T>(method: &str, request: &Request<T>) -> Self {
        let consumer = request
            .metadata()
            .get(CONSUMER_METADATA_KEY)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| ConsumerId::new(value).ok());

        Self::new(method, consumer, request.remote_addr())
    }
}

/// A call that passed the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedCall {
    pub consumer: ConsumerId,
    pub peer: SocketAddr,
    pub method: String,
}

/// The interceptor chain shared by every service.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct InterceptorPipeline {
    gate: Arc<AuthorizationGate>,
    bus: EventBus,
    stats: StatsAggregator,
}

impl InterceptorPipeline {
    #[must_use]
    pub fn new(gate: Arc<AuthorizationGate>, bus: EventBus, stats: StatsAggregator) -> Self {
        Self { gate, bus, stats }
    }

    #[must_use]
    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Run the unary chain for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the identity or authorization failure that stopped the call.
    pub fn admit_unary(&self, ctx: CallContext) -> Result<AdmittedCall, BastionError> {
        let call = self.extract(ctx)?;
        self.publish(&call);
        self.stats.record(&call.consumer, &call.method);
        self.authorize(&call)?;
        Ok(call)
    }

    /// Run the streaming chain for `ctx`.
    ///
    /// Authorization happens before the call is counted, so a refused stream
    /// never shows up in statistics windows.
    ///
    /// # Errors
    ///
    /// Returns the identity or authorization failure that stopped the call.
    pub fn admit_stream(&self, ctx: CallContext) -> Result<AdmittedCall, BastionError> {
        let call = self.extract(ctx)?;
        self.publish(&call);
        self.authorize(&call)?;
        self.stats.record(&call.consumer, &call.method);
        Ok(call)
    }

    /// Admit a unary call, then run `handler` and return its result unchanged.
    ///
    /// `handler` never runs for a refused call.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's refusal as a [`Status`], or whatever `handler`
    /// returns.
    pub async fn unary<F, Fut, R>(&self, ctx: CallContext, handler: F) -> Result<R, Status>
    where
        F: FnOnce(AdmittedCall) -> Fut,
        Fut: Future<Output = Result<R, Status>>,
    {
        let call = self.admit_unary(ctx)?;
        handler(call).await
    }

    /// Admit a streaming call, then run `handler` to open the stream.
    ///
    /// `handler` never runs for a refused call.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's refusal as a [`Status`], or whatever `handler`
    /// returns.
    pub async fn streaming<F, Fut, R>(&self, ctx: CallContext, handler: F) -> Result<R, Status>
    where
        F: FnOnce(AdmittedCall) -> Fut,
        Fut: Future<Output = Result<R, Status>>,
    {
        let call = self.admit_stream(ctx)?;
        handler(call).await
    }

    fn extract(&self, ctx: CallContext) -> Result<AdmittedCall, BastionError> {
        let CallContext {
            method,
            consumer,
            peer,
        } = ctx;

        let Some(consumer) = consumer else {
            debug!(
                target: "bastion.grpc.pipeline",
                method = %method,
                "Rejected call without consumer"
            );
            metrics::record_call_denied(&method, "missing consumer");
            return Err(BastionError::MissingConsumer);
        };

        let Some(peer) = peer else {
            debug!(
                target: "bastion.grpc.pipeline",
                method = %method,
                consumer = %consumer,
                "Rejected call without peer address"
            );
            metrics::record_call_denied(&method, "peer unavailable");
            return Err(BastionError::PeerUnavailable);
        };

        Ok(AdmittedCall {
            consumer,
            peer,
            method,
        })
    }

    fn publish(&self, call: &AdmittedCall) {
        let event = AuditEvent::now(call.peer.to_string(), call.consumer.clone(), &call.method);
        let report = self.bus.publish(&event);
        trace!(
            target: "bastion.grpc.pipeline",
            method = %call.method,
            delivered = report.delivered,
            dropped = report.dropped,
            "Audit event published"
        );
    }

    fn authorize(&self, call: &AdmittedCall) -> Result<(), BastionError> {
        match self.gate.authorize(Some(&call.consumer), &call.method) {
            Decision::Allowed => {
                metrics::record_call_allowed(&call.method);
                Ok(())
            }
            Decision::Denied(reason) => {
                debug!(
                    target: "bastion.grpc.pipeline",
                    method = %call.method,
                    consumer = %call.consumer,
                    reason = reason.as_str(),
                    "Call denied"
                );
                metrics::record_call_denied(&call.method, reason.as_str());
                Err(reason.into_error(Some(&call.consumer), &call.method))
            }
        }
    }
}

impl std::fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field("consumers", &self.gate.acl().len())
            .field("subscribers", &self.bus.subscriber_count())
            .field("stat_windows", &self.stats.window_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::acl::Acl;
    use crate::stats::DEFAULT_MAX_STAT_INTERVAL;
    use proto_gen::paths;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tonic::Code;

    fn pipeline() -> InterceptorPipeline {
        let acl = Acl::from_json(
            r#"{
                "alice": ["/bastion.Biz/*"],
                "logger": ["/bastion.Admin/Logging"],
                "stat": ["/bastion.Admin/Statistics"]
            }"#,
        )
        .unwrap();
        InterceptorPipeline::new(
            Arc::new(AuthorizationGate::new(acl)),
            EventBus::default(),
            StatsAggregator::new(DEFAULT_MAX_STAT_INTERVAL, CancellationToken::new()),
        )
    }

    fn id(name: &str) -> ConsumerId {
        ConsumerId::new(name).unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn ctx(method: &str, consumer: &str) -> CallContext {
        CallContext::new(method, Some(id(consumer)), Some(peer()))
    }

    #[test]
    fn test_context_from_request() {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(CONSUMER_METADATA_KEY, "alice".parse().unwrap());

        let ctx = CallContext::from_request(paths::BIZ_ADD, &request);
        assert_eq!(ctx.method, paths::BIZ_ADD);
        assert_eq!(ctx.consumer, Some(id("alice")));
        // Requests built outside a transport carry no peer
        assert_eq!(ctx.peer, None);
    }

    #[test]
    fn test_context_blank_consumer_is_missing() {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(CONSUMER_METADATA_KEY, "  ".parse().unwrap());

        assert_eq!(CallContext::from_request(paths::BIZ_ADD, &request).consumer, None);
    }

    #[test]
    fn test_missing_consumer_rejected_before_anything_else() {
        let pipeline = pipeline();
        let mut logger = pipeline.bus().subscribe(id("logger")).unwrap();

        let result = pipeline.admit_unary(CallContext::new(paths::BIZ_ADD, None, Some(peer())));

        assert_eq!(result.unwrap_err(), BastionError::MissingConsumer);
        assert_eq!(logger.try_recv(), None);
    }

    #[test]
    fn test_missing_peer_rejected() {
        let result = pipeline().admit_unary(CallContext::new(paths::BIZ_ADD, Some(id("alice")), None));
        assert_eq!(result.unwrap_err(), BastionError::PeerUnavailable);
    }

    #[test]
    fn test_allowed_call_is_audited() {
        let pipeline = pipeline();
        let mut logger = pipeline.bus().subscribe(id("logger")).unwrap();

        let call = pipeline.admit_unary(ctx(paths::BIZ_ADD, "alice")).unwrap();
        assert_eq!(call.consumer, id("alice"));
        assert_eq!(call.peer, peer());

        let event = logger.try_recv().unwrap();
        assert_eq!(event.consumer, id("alice"));
        assert_eq!(event.method, paths::BIZ_ADD);
        assert_eq!(event.host, "127.0.0.1:40000");
    }

    #[test]
    fn test_denied_call_is_still_audited() {
        let pipeline = pipeline();
        let mut logger = pipeline.bus().subscribe(id("logger")).unwrap();

        let result = pipeline.admit_unary(ctx(paths::ADMIN_LOGGING, "alice"));
        assert_eq!(
            result.unwrap_err().status_code(),
            Code::PermissionDenied
        );

        let event = logger.try_recv().unwrap();
        assert_eq!(event.method, paths::ADMIN_LOGGING);
    }

    #[test]
    fn test_unknown_consumer_is_unauthenticated() {
        let result = pipeline().admit_unary(ctx(paths::BIZ_ADD, "mallory"));
        assert_eq!(
            result.unwrap_err(),
            BastionError::UnknownConsumer("mallory".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_unary_is_counted() {
        let pipeline = pipeline();
        let _window = pipeline
            .stats()
            .open_window(id("stat"), Duration::from_secs(1))
            .unwrap();

        let _ = pipeline.admit_unary(ctx(paths::ADMIN_STATISTICS, "alice"));

        let window = pipeline.stats().peek("stat").unwrap();
        assert_eq!(window.by_method.get(paths::ADMIN_STATISTICS), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_stream_is_not_counted() {
        let pipeline = pipeline();
        let _window = pipeline
            .stats()
            .open_window(id("stat"), Duration::from_secs(1))
            .unwrap();

        let _ = pipeline.admit_stream(ctx(paths::ADMIN_LOGGING, "alice"));
        assert_eq!(pipeline.stats().peek("stat").unwrap().total(), 0);

        pipeline.admit_stream(ctx(paths::ADMIN_LOGGING, "logger")).unwrap();
        assert_eq!(pipeline.stats().peek("stat").unwrap().total(), 1);
    }

    #[tokio::test]
    async fn test_unary_runs_handler_when_allowed() {
        let result = pipeline()
            .unary(ctx(paths::BIZ_CHECK, "alice"), |call| async move {
                Ok(call.method)
            })
            .await;

        assert_eq!(result.unwrap(), paths::BIZ_CHECK);
    }

    #[tokio::test]
    async fn test_unary_handler_error_is_returned_unchanged() {
        let result: Result<(), Status> = pipeline()
            .unary(ctx(paths::BIZ_CHECK, "alice"), |_| async {
                Err(Status::unavailable("busy"))
            })
            .await;

        let status = result.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), "busy");
    }

    #[tokio::test]
    async fn test_denied_unary_never_runs_handler() {
        let ran = AtomicBool::new(false);
        let result = pipeline()
            .unary(ctx(paths::ADMIN_LOGGING, "alice"), |_| async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap_err().code(), Code::PermissionDenied);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_denied_stream_never_runs_handler() {
        let ran = AtomicBool::new(false);
        let result = pipeline()
            .streaming(ctx(paths::ADMIN_STATISTICS, "logger"), |_| async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap_err().code(), Code::PermissionDenied);
        assert!(!ran.load(Ordering::SeqCst));
    }
}
