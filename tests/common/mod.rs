// Shared test helpers: an in-memory container runtime driven by the test.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use rtc_mem_bench::error::BenchError;
use rtc_mem_bench::runtime::{ContainerRuntime, CreateSpec, LogStream, MemoryStream};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

#[derive(Default)]
struct FakeState {
    networks: Vec<String>,
    network_creations: usize,
    created: Vec<(String, CreateSpec)>,
    started: Vec<String>,
    removed: Vec<String>,
    remove_calls: usize,
    fail_removal: HashSet<String>,
    unattached_images: HashSet<String>,
    unavailable: bool,
    log_tx: HashMap<String, mpsc::UnboundedSender<Bytes>>,
    log_rx: HashMap<String, mpsc::UnboundedReceiver<Bytes>>,
    mem_tx: HashMap<String, mpsc::UnboundedSender<u64>>,
    mem_rx: HashMap<String, mpsc::UnboundedReceiver<u64>>,
    exits: HashMap<String, watch::Sender<Option<i64>>>,
}

/// Containers are created with ids `c0`, `c1`, ... and get address `10.0.0.<n>`.
/// Output, memory samples and exits are pushed by the test.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    /// Simulated latency of each removal, so concurrent cleanups overlap.
    pub remove_delay: Duration,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            remove_delay: Duration::from_millis(20),
            ..Default::default()
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_network(&self, name: &str) {
        self.state().networks.push(name.to_string());
    }

    pub fn set_unavailable(&self) {
        self.state().unavailable = true;
    }

    pub fn fail_removal_of(&self, id: &str) {
        self.state().fail_removal.insert(id.to_string());
    }

    /// Containers of this image come up without an address on their network.
    pub fn detach_image(&self, image: &str) {
        self.state().unattached_images.insert(image.to_string());
    }

    pub fn network_creations(&self) -> usize {
        self.state().network_creations
    }

    pub fn created(&self) -> Vec<(String, CreateSpec)> {
        self.state().created.clone()
    }

    pub fn created_with_image(&self, image: &str) -> Vec<String> {
        self.state()
            .created
            .iter()
            .filter(|(_, spec)| spec.image == image)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn started(&self) -> Vec<String> {
        self.state().started.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state().removed.clone()
    }

    pub fn remove_calls(&self) -> usize {
        self.state().remove_calls
    }

    /// Writes one newline-terminated line to the container's output.
    pub fn emit(&self, id: &str, line: &str) {
        self.emit_raw(id, format!("{}\n", line).as_bytes());
    }

    pub fn emit_raw(&self, id: &str, bytes: &[u8]) {
        if let Some(tx) = self.state().log_tx.get(id) {
            let _ = tx.send(Bytes::copy_from_slice(bytes));
        }
    }

    /// Ends the container's output stream.
    pub fn close_logs(&self, id: &str) {
        self.state().log_tx.remove(id);
    }

    pub fn report_memory(&self, id: &str, bytes: u64) {
        if let Some(tx) = self.state().mem_tx.get(id) {
            let _ = tx.send(bytes);
        }
    }

    pub fn exit(&self, id: &str, code: i64) {
        // send_replace keeps the status even before anyone waits
        if let Some(tx) = self.state().exits.get(id) {
            tx.send_replace(Some(code));
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_networks(&self, name: &str) -> Result<Vec<String>, BenchError> {
        let state = self.state();
        if state.unavailable {
            return Err(BenchError::RuntimeUnavailable("daemon gone".into()));
        }
        // Docker's name filter matches substrings
        Ok(state
            .networks
            .iter()
            .filter(|n| n.contains(name))
            .cloned()
            .collect())
    }

    async fn create_network(&self, name: &str) -> Result<(), BenchError> {
        let mut state = self.state();
        state.network_creations += 1;
        state.networks.push(name.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String, BenchError> {
        let mut state = self.state();
        if state.unavailable {
            return Err(BenchError::RuntimeUnavailable("daemon gone".into()));
        }
        let id = format!("c{}", state.created.len());
        state.created.push((id.clone(), spec.clone()));
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        state.log_tx.insert(id.clone(), log_tx);
        state.log_rx.insert(id.clone(), log_rx);
        let (mem_tx, mem_rx) = mpsc::unbounded_channel();
        state.mem_tx.insert(id.clone(), mem_tx);
        state.mem_rx.insert(id.clone(), mem_rx);
        state.exits.insert(id.clone(), watch::channel(None).0);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), BenchError> {
        self.state().started.push(id.to_string());
        Ok(())
    }

    async fn network_address(
        &self,
        id: &str,
        _network: &str,
    ) -> Result<Option<String>, BenchError> {
        let state = self.state();
        let Some(index) = state.created.iter().position(|(c, _)| c == id) else {
            return Ok(None);
        };
        if state.unattached_images.contains(&state.created[index].1.image) {
            return Ok(None);
        }
        Ok(Some(format!("10.0.0.{}", index + 1)))
    }

    fn logs(&self, id: &str) -> LogStream {
        match self.state().log_rx.remove(id) {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (Ok(chunk), rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    fn memory_usage(&self, id: &str) -> MemoryStream {
        match self.state().mem_rx.remove(id) {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|sample| (Ok(sample), rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    async fn wait(&self, id: &str) -> Result<i64, BenchError> {
        let mut rx = self
            .state()
            .exits
            .get(id)
            .map(|tx| tx.subscribe())
            .ok_or_else(|| BenchError::Runtime(format!("no such container {}", id)))?;
        let code = *rx
            .wait_for(|code| code.is_some())
            .await
            .map_err(|e| BenchError::Runtime(e.to_string()))?;
        Ok(code.unwrap_or_default())
    }

    async fn remove_container(&self, id: &str) -> Result<(), BenchError> {
        self.state().remove_calls += 1;
        tokio::time::sleep(self.remove_delay).await;
        let mut state = self.state();
        if state.fail_removal.contains(id) {
            return Err(BenchError::RemovalFailure {
                container: id.to_string(),
                reason: "device or resource busy".into(),
            });
        }
        state.removed.push(id.to_string());
        state.log_tx.remove(id);
        state.mem_tx.remove(id);
        Ok(())
    }
}

/// Polls `check` (yielding to the runtime between polls) until it holds or ~10s of
/// (possibly paused) time has passed.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..10_000 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    check()
}

/// Lets spawned tasks run for a stretch of (possibly paused) time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn report(rooms: u64, clients: u64, sum: u64, count: u64) -> String {
    format!(
        r#"{{"roomsCreated":{},"clientsConnected":{},"loopAvgSum":{},"loopAvgCount":{}}}"#,
        rooms, clients, sum, count
    )
}

/// Awaits a future with a generous timeout so a broken test fails instead of hanging.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(60), fut)
        .await
        .expect("timed out")
}
