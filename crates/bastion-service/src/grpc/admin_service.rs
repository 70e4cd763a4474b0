//! Admin service: live audit feed and periodic call statistics.
//!
//! Both methods are long-lived server streams. Each admitted call opens a
//! consumer-scoped source (a bus [`Subscription`](crate::events::Subscription)
//! or a [`StatWindowHandle`](crate::stats::StatWindowHandle)) and hands it to
//! a forwarder task that copies items into the response stream until one of:
//!
//! - the client goes away (response stream dropped),
//! - the server shuts down (shutdown token cancelled),
//! - the source ends.
//!
//! The forwarder owns the source, so every exit path drops it, and dropping
//! it unsubscribes or closes the window.

use super::pipeline::{CallContext, InterceptorPipeline};
use proto_gen::bastion::admin_server::Admin;
use proto_gen::bastion::{Event, Nothing, Stat, StatInterval};
use proto_gen::paths;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, instrument};

/// Response-side buffer between a forwarder task and tonic.
const RESPONSE_BUFFER: usize = 16;

/// gRPC implementation of `bastion.Admin`.
#[derive(Debug, Clone)]
pub struct AdminService {
    pipeline: InterceptorPipeline,
    shutdown: CancellationToken,
}

impl AdminService {
    /// Create the service. Cancelling `shutdown` ends every open stream.
    #[must_use]
    pub fn new(pipeline: InterceptorPipeline, shutdown: CancellationToken) -> Self {
        Self { pipeline, shutdown }
    }
}

#[tonic::async_trait]
impl Admin for AdminService {
    type LoggingStream = ReceiverStream<Result<Event, Status>>;
    type StatisticsStream = ReceiverStream<Result<Stat, Status>>;

    #[instrument(skip_all, name = "bastion.grpc.admin.logging")]
    async fn logging(
        &self,
        request: Request<Nothing>,
    ) -> Result<Response<Self::LoggingStream>, Status> {
        let ctx = CallContext::from_request(paths::ADMIN_LOGGING, &request);
        let bus = self.pipeline.bus().clone();
        let shutdown = self.shutdown.clone();

        self.pipeline
            .streaming(ctx, |call| async move {
                let subscription = bus.subscribe(call.consumer)?;
                Ok::<_, Status>(Response::new(forward(subscription, shutdown, "logging")))
            })
            .await
    }

    #[instrument(skip_all, name = "bastion.grpc.admin.statistics")]
    async fn statistics(
        &self,
        request: Request<StatInterval>,
    ) -> Result<Response<Self::StatisticsStream>, Status> {
        let ctx = CallContext::from_request(paths::ADMIN_STATISTICS, &request);
        let interval = Duration::from_secs(request.get_ref().interval_seconds);
        let stats = self.pipeline.stats().clone();
        let shutdown = self.shutdown.clone();

        self.pipeline
            .streaming(ctx, |call| async move {
                let window = stats.open_window(call.consumer, interval)?;
                Ok::<_, Status>(Response::new(forward(window, shutdown, "statistics")))
            })
            .await
    }
}

/// Spawn a task that copies `source` into a response stream.
fn forward<S, T, U>(
    mut source: S,
    shutdown: CancellationToken,
    stream: &'static str,
) -> ReceiverStream<Result<U, Status>>
where
    S: Stream<Item = T> + Unpin + Send + 'static,
    T: Into<U> + Send + 'static,
    U: Send + 'static,
{
    let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);

    tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                () = shutdown.cancelled() => break,
                () = tx.closed() => break,
                item = source.next() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                sent = tx.send(Ok(item.into())) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        drop(source);
        debug!(target: "bastion.grpc.admin", stream, "Admin stream closed");
    });

    ReceiverStream::new(rx)
}
