// Container lifecycle on top of the runtime: create + register + start, address lookup,
// log and memory subscriptions, exit wait, bulk removal.

use crate::error::BenchError;
use crate::runtime::{ContainerRuntime, CreateSpec};
use crate::session::Session;
use futures_util::StreamExt;
use futures_util::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::AbortHandle;

/// Receives one complete output line at a time.
pub type LineSink = Box<dyn FnMut(&str) + Send + 'static>;

pub struct StartSpec {
    pub image: String,
    pub cmd: Option<Vec<String>>,
    pub memory_limit_bytes: Option<i64>,
    pub network: String,
    pub stdout_sink: Option<LineSink>,
    pub track_resource_usage: bool,
}

impl StartSpec {
    pub fn new(image: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            cmd: None,
            memory_limit_bytes: None,
            network: network.into(),
            stdout_sink: None,
            track_resource_usage: false,
        }
    }
}

/// A started container. Owns its log/stats subscriptions; dropping the handle
/// (or calling `unsubscribe`) stops them.
pub struct ContainerHandle {
    id: String,
    ip_address: String,
    memory_usage: Arc<AtomicU64>,
    subscriptions: Vec<AbortHandle>,
}

impl ContainerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    /// Latest memory usage sample; 0 until the first one arrives.
    pub fn memory_usage_bytes(&self) -> u64 {
        self.memory_usage.load(Ordering::Relaxed)
    }

    /// Shared cell updated by the stats subscription, for readers that outlive a borrow.
    pub fn memory_gauge(&self) -> Arc<AtomicU64> {
        self.memory_usage.clone()
    }

    pub fn unsubscribe(&mut self) {
        for s in self.subscriptions.drain(..) {
            s.abort();
        }
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Outcome of a bulk removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct LifecycleClient {
    session: Arc<Session>,
}

impl LifecycleClient {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Creates the network unless one with exactly this name already exists.
    pub async fn ensure_network(&self, name: &str) -> Result<(), BenchError> {
        let existing = self.session.runtime().list_networks(name).await?;
        let exists = existing.iter().any(|n| n == name);
        tracing::info!(network = %name, exists, "checked network");
        if !exists {
            self.session.runtime().create_network(name).await?;
            tracing::info!(network = %name, "created network");
        }
        Ok(())
    }

    pub async fn start_container(&self, spec: StartSpec) -> Result<ContainerHandle, BenchError> {
        let runtime = self.session.runtime().clone();
        let StartSpec {
            image,
            cmd,
            memory_limit_bytes,
            network,
            stdout_sink,
            track_resource_usage,
        } = spec;

        tracing::info!(image = %image, "creating container");
        let create = CreateSpec {
            image,
            cmd,
            memory_limit_bytes,
            network: network.clone(),
            auto_remove: true,
        };
        let id = runtime.create_container(&create).await?;
        self.session.register(&id);
        tracing::info!(container = %id, "created container, starting");
        runtime.start_container(&id).await?;
        tracing::info!(container = %id, "started container");

        let ip_address = runtime
            .network_address(&id, &network)
            .await?
            .ok_or_else(|| BenchError::NetworkAttachmentMissing {
                container: id.clone(),
                network: network.clone(),
            })?;

        let mut handle = ContainerHandle {
            id,
            ip_address,
            memory_usage: Arc::new(AtomicU64::new(0)),
            subscriptions: Vec::new(),
        };
        if let Some(sink) = stdout_sink {
            let pump = spawn_log_pump(runtime.clone(), handle.id.clone(), sink);
            handle.subscriptions.push(pump);
        }
        if track_resource_usage {
            let pump = spawn_memory_pump(runtime, handle.id.clone(), handle.memory_gauge());
            handle.subscriptions.push(pump);
        }
        Ok(handle)
    }

    /// Suspends until the container exits; returns its status code.
    pub async fn wait_for_exit(&self, handle: &ContainerHandle) -> Result<i64, BenchError> {
        self.session.runtime().wait(handle.id()).await
    }
}

fn spawn_log_pump(runtime: Arc<dyn ContainerRuntime>, id: String, mut sink: LineSink) -> AbortHandle {
    tokio::spawn(async move {
        let mut stream = runtime.logs(&id);
        let mut lines = LineBuffer::default();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for line in lines.push(&bytes) {
                        sink(&line);
                    }
                }
                Err(e) => {
                    tracing::warn!(container = %id, error = %e, "log stream error");
                    break;
                }
            }
        }
        if let Some(line) = lines.finish() {
            sink(&line);
        }
        tracing::info!(container = %id, "log stream ended");
    })
    .abort_handle()
}

fn spawn_memory_pump(
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    gauge: Arc<AtomicU64>,
) -> AbortHandle {
    tokio::spawn(async move {
        let mut stream = runtime.memory_usage(&id);
        while let Some(sample) = stream.next().await {
            match sample {
                Ok(bytes) => gauge.store(bytes, Ordering::Relaxed),
                Err(e) => {
                    tracing::warn!(container = %id, error = %e, "stats stream error");
                    break;
                }
            }
        }
        tracing::info!(container = %id, "stats stream ended");
    })
    .abort_handle()
}

/// Stops and deletes every container in parallel. Each removal runs to completion
/// whatever happens to its siblings; failures are logged and counted, never raised.
pub async fn remove_containers(runtime: &dyn ContainerRuntime, ids: &[String]) -> CleanupReport {
    let removals = ids.iter().map(|id| async move {
        tracing::info!(container = %id, "removing container");
        match runtime.remove_container(id).await {
            Ok(()) => {
                tracing::info!(container = %id, "removed container");
                true
            }
            Err(e) => {
                tracing::warn!(container = %id, error = %e, operation = "remove_container", "container removal failed");
                false
            }
        }
    });
    let results = join_all(removals).await;
    let removed = results.iter().filter(|ok| **ok).count();
    CleanupReport {
        removed,
        failed: results.len() - removed,
    }
}

/// Reassembles newline-terminated lines from arbitrarily split output chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Appends a chunk and returns every line it completed (trimmed, blanks skipped).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever unterminated text is left once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}
