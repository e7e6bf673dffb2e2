// Per-client report and snapshot, and the two ways of folding one into the other.

use crate::error::BenchError;
use serde::Deserialize;

/// One progress line printed by a client container. Extra fields (e.g. the client's
/// own timestamp) are ignored; all four counters are required.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientReport {
    pub rooms_created: u64,
    pub clients_connected: u64,
    pub loop_avg_sum: f64,
    pub loop_avg_count: u64,
}

impl ClientReport {
    pub fn parse(line: &str) -> Result<Self, BenchError> {
        serde_json::from_str(line.trim()).map_err(|e| BenchError::ProtocolParse {
            line: line.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Most recently known metric state for one client.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClientSnapshot {
    pub rooms_created: u64,
    pub clients_connected: u64,
    pub loop_avg_sum: f64,
    pub loop_avg_count: u64,
}

impl From<ClientReport> for ClientSnapshot {
    fn from(r: ClientReport) -> Self {
        Self {
            rooms_created: r.rooms_created,
            clients_connected: r.clients_connected,
            loop_avg_sum: r.loop_avg_sum,
            loop_avg_count: r.loop_avg_count,
        }
    }
}

impl ClientSnapshot {
    pub fn reset_loop(&mut self) {
        self.loop_avg_sum = 0.0;
        self.loop_avg_count = 0;
    }
}

/// How a new report is folded into a client's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Gauges take the latest value, loop accumulators add up until the next dump
    /// zeroes them (per-interval rate). Used by continuous mode.
    Accumulate,
    /// The latest report replaces the snapshot wholesale and nothing is reset
    /// (point-in-time value). Used by fixed-population mode.
    Replace,
}

impl MergePolicy {
    pub fn merge(self, snapshot: &mut ClientSnapshot, report: ClientReport) {
        match self {
            MergePolicy::Accumulate => {
                snapshot.rooms_created = report.rooms_created;
                snapshot.clients_connected = report.clients_connected;
                snapshot.loop_avg_sum += report.loop_avg_sum;
                snapshot.loop_avg_count += report.loop_avg_count;
            }
            MergePolicy::Replace => *snapshot = report.into(),
        }
    }

    pub fn resets_after_dump(self) -> bool {
        matches!(self, MergePolicy::Accumulate)
    }
}
