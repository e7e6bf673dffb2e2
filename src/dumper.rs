// Periodic result dumper: every interval, aggregate the live client snapshots plus the
// server's memory usage into one CSV row.
// Columns: timestamp,roomsCreated,clientsConnected,meanLoopDelay,serverMemoryBytes (no header).

use crate::board::SnapshotBoard;
use crate::error::BenchError;
use crate::models::AggregateSnapshot;
use chrono::{DateTime, SecondsFormat, Utc};
use csv::WriterBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration, Instant, interval_at};

/// `<dir>/<server image>-<start time>.csv`, with characters that are unsafe in a file
/// name (`:` in the timestamp, `/` and `:` in image references) replaced by `_`.
pub fn result_path(dir: &Path, server_image: &str, started_at: DateTime<Utc>) -> PathBuf {
    let image = server_image.replace(['/', ':'], "_");
    let stamp = started_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "_");
    dir.join(format!("{}-{}.csv", image, stamp))
}

/// Columns of one result row, in file order.
pub fn row_record(at: DateTime<Utc>, agg: &AggregateSnapshot) -> [String; 5] {
    [
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        agg.rooms_created.to_string(),
        agg.clients_connected.to_string(),
        agg.mean_loop_delay().to_string(),
        agg.server_memory_bytes.to_string(),
    ]
}

/// Run-scoped CSV file without a header row. Each row is flushed as it is written.
pub struct ResultFile {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl ResultFile {
    /// Creates the parent directory if needed, then the file.
    pub fn create(path: PathBuf) -> Result<Self, BenchError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(File::create(&path)?);
        tracing::info!(path = %path.display(), "writing results");
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &[String; 5]) -> Result<(), BenchError> {
        self.writer.write_record(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Shared state the dumper samples on each tick.
pub struct DumperDeps {
    pub board: Arc<SnapshotBoard>,
    pub server_memory: Arc<AtomicU64>,
    pub file: ResultFile,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Aggregates once and appends the row. Returns the aggregate that was written.
pub fn dump_once(
    board: &SnapshotBoard,
    server_memory: &AtomicU64,
    file: &mut ResultFile,
) -> Result<AggregateSnapshot, BenchError> {
    let agg = board.collect(server_memory.load(Ordering::Relaxed));
    file.append(&row_record(Utc::now(), &agg))?;
    Ok(agg)
}

/// Spawns the dumper. First row is written one full interval after spawn; the task
/// exits when `shutdown_rx` fires or its sender is dropped.
pub fn spawn(deps: DumperDeps, every: Duration) -> tokio::task::JoinHandle<()> {
    let DumperDeps {
        board,
        server_memory,
        mut file,
        mut shutdown_rx,
    } = deps;

    tokio::spawn(async move {
        let mut tick = interval_at(Instant::now() + every, every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut rows_written: u64 = 0;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match dump_once(&board, &server_memory, &mut file) {
                        Ok(agg) => {
                            rows_written += 1;
                            tracing::debug!(
                                rooms_created = agg.rooms_created,
                                clients_connected = agg.clients_connected,
                                server_memory_bytes = agg.server_memory_bytes,
                                "result row written"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                operation = "dump_results",
                                path = %file.path().display(),
                                "failed to write result row"
                            );
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!(rows_written, "Result dumper shutting down");
                    break;
                }
            }
        }
    })
}
