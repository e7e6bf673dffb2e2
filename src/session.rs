// One benchmark session: the runtime, every container id started so far, and the
// memoized teardown of all of them.

use crate::lifecycle::{CleanupReport, remove_containers};
use crate::runtime::ContainerRuntime;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

pub struct Session {
    runtime: Arc<dyn ContainerRuntime>,
    started: Mutex<Vec<String>>,
    cleanup: OnceCell<CleanupReport>,
}

impl Session {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            started: Mutex::new(Vec::new()),
            cleanup: OnceCell::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Records a container that must be torn down. Called right after creation,
    /// before the container is started or handed to anyone else.
    pub fn register(&self, id: &str) {
        self.lock_started().push(id.to_string());
        tracing::debug!(container = %id, "registered container");
    }

    /// Ids registered so far, in start order.
    pub fn started(&self) -> Vec<String> {
        self.lock_started().clone()
    }

    pub fn has_started_containers(&self) -> bool {
        !self.lock_started().is_empty()
    }

    /// True once the removal batch has run to completion.
    pub fn cleanup_finished(&self) -> bool {
        self.cleanup.initialized()
    }

    /// Removes every registered container. Runs the removal batch at most once per
    /// session; concurrent and later callers get the same report. Never fails.
    pub async fn cleanup(&self) -> &CleanupReport {
        self.cleanup
            .get_or_init(|| async {
                let ids = self.started();
                tracing::info!(containers = ids.len(), "removing all started containers");
                remove_containers(self.runtime.as_ref(), &ids).await
            })
            .await
    }

    fn lock_started(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        // a poisoned registry is still the best list of what to tear down
        self.started.lock().unwrap_or_else(|e| e.into_inner())
    }
}
