// Benchmark scenario: server up, warm-up, dumper, then clients by one of two strategies.

use crate::board::SnapshotBoard;
use crate::config::{BenchConfig, OrchestrationMode};
use crate::dumper::{self, DumperDeps, ResultFile};
use crate::error::BenchError;
use crate::lifecycle::{ContainerHandle, LifecycleClient, LineSink, StartSpec};
use crate::models::MergePolicy;
use crate::session::Session;
use chrono::{DateTime, Utc};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;

/// Fires once when a client's reported room count reaches its target.
struct RampSignal {
    target: u64,
    tx: mpsc::UnboundedSender<()>,
}

/// Clients started so far plus the dumper's stop handle; dropping it tears both down.
struct Population {
    clients: Vec<ContainerHandle>,
    _dumper_stop: oneshot::Sender<()>,
}

pub struct Benchmark {
    config: Arc<BenchConfig>,
    lifecycle: LifecycleClient,
    board: Arc<SnapshotBoard>,
    started_at: DateTime<Utc>,
}

impl Benchmark {
    pub fn new(config: BenchConfig, session: Arc<Session>) -> Self {
        let policy = match config.orchestration.mode {
            OrchestrationMode::Continuous => MergePolicy::Accumulate,
            OrchestrationMode::Fixed => MergePolicy::Replace,
        };
        Self {
            config: Arc::new(config),
            lifecycle: LifecycleClient::new(session),
            board: Arc::new(SnapshotBoard::new(policy)),
            started_at: Utc::now(),
        }
    }

    pub fn board(&self) -> &Arc<SnapshotBoard> {
        &self.board
    }

    pub fn result_path(&self) -> PathBuf {
        dumper::result_path(
            &self.config.results.dir,
            &self.config.server.image,
            self.started_at,
        )
    }

    /// Runs until the server container exits, which always surfaces as
    /// `ContainerCrashed`; any infrastructure failure before that is returned as is.
    pub async fn run(&self) -> Result<Infallible, BenchError> {
        self.lifecycle
            .ensure_network(&self.config.network.name)
            .await?;

        tracing::info!(image = %self.config.server.image, "starting server container");
        let mut spec = StartSpec::new(&self.config.server.image, &self.config.network.name);
        spec.memory_limit_bytes = Some(self.config.server.memory_limit_bytes);
        spec.track_resource_usage = true;
        let server = self.lifecycle.start_container(spec).await?;
        tracing::info!(container = %server.id(), ip = %server.ip_address(), "server container up");

        let exit = self.lifecycle.wait_for_exit(&server);
        tokio::pin!(exit);

        let population = tokio::select! {
            population = self.load(&server) => population?,
            code = &mut exit => return Err(crashed(&server, code?)),
        };
        tracing::info!(
            clients = population.clients.len(),
            "client launch finished; holding population until the server exits"
        );
        let code = exit.await?;
        drop(population);
        Err(crashed(&server, code))
    }

    async fn load(&self, server: &ContainerHandle) -> Result<Population, BenchError> {
        let warmup = Duration::from_millis(self.config.server.warmup_delay_ms);
        tracing::info!(delay_ms = self.config.server.warmup_delay_ms, "waiting for server warm-up");
        tokio::time::sleep(warmup).await;

        let (dumper_stop, shutdown_rx) = oneshot::channel();
        dumper::spawn(
            DumperDeps {
                board: self.board.clone(),
                server_memory: server.memory_gauge(),
                file: ResultFile::create(self.result_path())?,
                shutdown_rx,
            },
            Duration::from_millis(self.config.results.dump_interval_ms),
        );

        let clients = match self.config.orchestration.mode {
            OrchestrationMode::Continuous => self.run_batches(server).await?,
            OrchestrationMode::Fixed => self.start_population(server).await?,
        };
        Ok(Population {
            clients,
            _dumper_stop: dumper_stop,
        })
    }

    /// Starts batch after batch; each one must ramp up fully before the next starts.
    async fn run_batches(&self, server: &ContainerHandle) -> Result<Vec<ContainerHandle>, BenchError> {
        let target = u64::from(self.config.rooms_per_client());
        let size = self.config.orchestration.containers_per_batch;
        let mut clients = Vec::new();
        let mut batch: u32 = 0;

        loop {
            if let Some(max) = self.config.orchestration.max_batches
                && batch >= max
            {
                return Ok(clients);
            }
            batch += 1;
            tracing::info!(batch, containers = size, target_rooms = target, "starting client batch");

            let (ramped_tx, mut ramped_rx) = mpsc::unbounded_channel();
            for _ in 0..size {
                let signal = RampSignal {
                    target,
                    tx: ramped_tx.clone(),
                };
                clients.push(self.start_client(server, Some(signal)).await?);
            }
            drop(ramped_tx);

            for _ in 0..size {
                if ramped_rx.recv().await.is_none() {
                    return Err(BenchError::RampUpStalled { batch });
                }
            }
            tracing::info!(batch, "client batch ramped up");
        }
    }

    /// Starts the whole population up front without waiting on any progress.
    async fn start_population(
        &self,
        server: &ContainerHandle,
    ) -> Result<Vec<ContainerHandle>, BenchError> {
        let count = self.config.orchestration.fixed_clients;
        let mut clients = Vec::with_capacity(count as usize);
        for _ in 0..count {
            clients.push(self.start_client(server, None).await?);
        }
        tracing::info!(clients = count, "client population started");
        Ok(clients)
    }

    async fn start_client(
        &self,
        server: &ContainerHandle,
        ramp: Option<RampSignal>,
    ) -> Result<ContainerHandle, BenchError> {
        let cmd = self.config.client_command(server.ip_address());
        tracing::info!(cmd = %cmd.join(" "), "starting client container");

        let lease = self.board.lease();
        let mut ramp = ramp;
        let sink: LineSink = Box::new(move |line: &str| match lease.apply_line(line) {
            Ok(snapshot) => {
                if ramp
                    .as_ref()
                    .is_some_and(|r| snapshot.rooms_created >= r.target)
                    && let Some(r) = ramp.take()
                {
                    let _ = r.tx.send(());
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "parse_client_line", "dropping client line");
            }
        });

        let mut spec = StartSpec::new(&self.config.client.image, &self.config.network.name);
        spec.cmd = Some(cmd);
        spec.stdout_sink = Some(sink);
        self.lifecycle.start_container(spec).await
    }
}

fn crashed(server: &ContainerHandle, code: i64) -> BenchError {
    tracing::error!(container = %server.id(), code, "server container exited");
    BenchError::ContainerCrashed {
        container: server.id().to_string(),
        code,
    }
}
