// Metric models: what clients report, what we keep per client, what we dump.

mod aggregate;
mod snapshot;

pub use aggregate::{AggregateSnapshot, MeanLoopDelay};
pub use snapshot::{ClientReport, ClientSnapshot, MergePolicy};
