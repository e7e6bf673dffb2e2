// Aggregate over all live client snapshots plus server memory; one per dump interval.

use super::ClientSnapshot;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateSnapshot {
    pub rooms_created: u64,
    pub clients_connected: u64,
    pub loop_avg_sum: f64,
    pub loop_avg_count: u64,
    pub server_memory_bytes: u64,
}

impl AggregateSnapshot {
    pub fn add(&mut self, s: &ClientSnapshot) {
        self.rooms_created += s.rooms_created;
        self.clients_connected += s.clients_connected;
        self.loop_avg_sum += s.loop_avg_sum;
        self.loop_avg_count += s.loop_avg_count;
    }

    pub fn mean_loop_delay(&self) -> MeanLoopDelay {
        if self.loop_avg_count == 0 {
            MeanLoopDelay::NoSamples
        } else {
            MeanLoopDelay::Mean(self.loop_avg_sum / self.loop_avg_count as f64)
        }
    }
}

/// Mean loop latency over an interval; undefined when no loop completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeanLoopDelay {
    Mean(f64),
    NoSamples,
}

impl fmt::Display for MeanLoopDelay {
    /// `NaN` for no samples, so CSV consumers see a non-finite value rather than a gap.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeanLoopDelay::Mean(v) => write!(f, "{}", v),
            MeanLoopDelay::NoSamples => f.write_str("NaN"),
        }
    }
}
