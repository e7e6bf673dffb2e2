// Narrow interface to the container runtime. The Docker implementation lives in `docker`;
// tests provide an in-memory one.

mod docker;

pub use docker::DockerRuntime;

use crate::error::BenchError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// Local port range set on every container so clients can open tens of thousands of sockets.
pub const EPHEMERAL_PORT_RANGE: &str = "1024 65535";

/// Reported by `wait` when the container was removed before its status could be read.
pub const UNKNOWN_EXIT_CODE: i64 = -1;

/// What the runtime needs to create one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub image: String,
    pub cmd: Option<Vec<String>>,
    pub memory_limit_bytes: Option<i64>,
    pub network: String,
    /// Runtime deletes the container by itself once it stops.
    pub auto_remove: bool,
}

/// Chunks of container output, already stripped of the runtime's stream framing.
pub type LogStream = BoxStream<'static, Result<Bytes, BenchError>>;

/// Memory usage samples (bytes) from the runtime's resource-usage stream.
pub type MemoryStream = BoxStream<'static, Result<u64, BenchError>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Names of networks matching `name` (the runtime may match by prefix).
    async fn list_networks(&self, name: &str) -> Result<Vec<String>, BenchError>;

    async fn create_network(&self, name: &str) -> Result<(), BenchError>;

    /// Creates (but does not start) a container; returns its id.
    async fn create_container(&self, spec: &CreateSpec) -> Result<String, BenchError>;

    async fn start_container(&self, id: &str) -> Result<(), BenchError>;

    /// Address of the container on `network`, if it is attached to it.
    async fn network_address(&self, id: &str, network: &str)
    -> Result<Option<String>, BenchError>;

    /// Follows stdout and stderr from the start of the container's life.
    fn logs(&self, id: &str) -> LogStream;

    fn memory_usage(&self, id: &str) -> MemoryStream;

    /// Resolves with the exit status code once the container has exited.
    async fn wait(&self, id: &str) -> Result<i64, BenchError>;

    /// Stops (forcefully) and deletes the container.
    async fn remove_container(&self, id: &str) -> Result<(), BenchError>;
}
