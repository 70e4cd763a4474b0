//! Test server harness for E2E testing
//!
//! Provides `TestBastionServer` for spawning real Bastion gRPC servers in tests.

use bastion_service::config::Config;
use bastion_service::grpc::{InterceptorPipeline, CONSUMER_METADATA_KEY};
use bastion_service::server;
use proto_gen::bastion::admin_client::AdminClient;
use proto_gen::bastion::biz_client::BizClient;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::Request;

pub use proto_gen::bastion::{Event, Nothing, Stat, StatInterval};

/// Test harness for spawning a Bastion server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let server = TestBastionServer::spawn(r#"{"bob": ["/bastion.Admin/Logging"]}"#).await?;
/// let mut admin = server.admin_client().await?;
/// let mut events = admin
///     .logging(as_consumer("bob", Nothing::default()))
///     .await?
///     .into_inner();
/// ```
pub struct TestBastionServer {
    addr: SocketAddr,
    config: Config,
    pipeline: InterceptorPipeline,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestBastionServer {
    /// Spawn a server with `acl_json` as its access control list.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Serve gRPC in the background until dropped
    pub async fn spawn(acl_json: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(HashMap::from([(
            "BASTION_ACL".to_string(),
            acl_json.to_string(),
        )]))
        .await
    }

    /// Spawn a server from an explicit set of configuration variables.
    pub async fn spawn_with_vars(mut vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        vars.insert(
            "BASTION_GRPC_BIND_ADDRESS".to_string(),
            "127.0.0.1:0".to_string(),
        );

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let listener = tokio::net::TcpListener::bind(&config.grpc_bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let shutdown = CancellationToken::new();
        let pipeline = server::build_pipeline(&config, &shutdown);

        let server_pipeline = pipeline.clone();
        let server_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = server::serve_pipeline(server_pipeline, listener, server_shutdown).await
            {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            pipeline,
            shutdown,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The pipeline the server runs, for inspecting bus and stats state.
    pub fn pipeline(&self) -> &InterceptorPipeline {
        &self.pipeline
    }

    /// Token whose cancellation shuts the server down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Connect a `bastion.Biz` client.
    pub async fn biz_client(&self) -> Result<BizClient<Channel>, anyhow::Error> {
        BizClient::connect(self.url())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect Biz client: {}", e))
    }

    /// Connect a `bastion.Admin` client.
    pub async fn admin_client(&self) -> Result<AdminClient<Channel>, anyhow::Error> {
        AdminClient::connect(self.url())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect Admin client: {}", e))
    }
}

impl Drop for TestBastionServer {
    fn drop(&mut self) {
        // Cancel first so open streams end, then abort the task for immediate cleanup
        self.shutdown.cancel();
        self._handle.abort();
    }
}

/// Wrap `message` in a request carrying `consumer` as its identity.
pub fn as_consumer<T>(consumer: &str, message: T) -> Request<T> {
    let mut request = Request::new(message);
    request.metadata_mut().insert(
        CONSUMER_METADATA_KEY,
        consumer.parse().expect("consumer must be valid metadata"),
    );
    request
}
