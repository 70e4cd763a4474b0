//! Business service.
//!
//! The `Biz` methods are placeholders: once the pipeline admits a call they
//! succeed with `dummy = true`.

use super::pipeline::{CallContext, InterceptorPipeline};
use proto_gen::bastion::biz_server::Biz;
use proto_gen::bastion::Nothing;
use proto_gen::paths;
use tonic::{Request, Response, Status};
use tracing::instrument;

/// gRPC implementation of `bastion.Biz`.
#[derive(Debug, Clone)]
pub struct BizService {
    pipeline: InterceptorPipeline,
}

impl BizService {
    #[must_use]
    pub fn new(pipeline: InterceptorPipeline) -> Self {
        Self { pipeline }
    }

    async fn handle(
        &self,
        method: &str,
        request: &Request<Nothing>,
    ) -> Result<Response<Nothing>, Status> {
        let ctx = CallContext::from_request(method, request);
        self.pipeline
            .unary(ctx, |_call| async {
                Ok::<_, Status>(Response::new(Nothing { dummy: true }))
            })
            .await
    }
}

#[tonic::async_trait]
impl Biz for BizService {
    #[instrument(skip_all, name = "bastion.grpc.biz.check")]
    async fn check(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        self.handle(paths::BIZ_CHECK, &request).await
    }

    #[instrument(skip_all, name = "bastion.grpc.biz.add")]
    async fn add(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        self.handle(paths::BIZ_ADD, &request).await
    }

    #[instrument(skip_all, name = "bastion.grpc.biz.test")]
    async fn test(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        self.handle(paths::BIZ_TEST, &request).await
    }
}
