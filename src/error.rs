// Error taxonomy for the benchmark core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    /// The container runtime daemon could not be reached.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Any other failure reported by the container runtime.
    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("container {container} has no address on network {network}")]
    NetworkAttachmentMissing { container: String, network: String },

    /// A client stdout line that is not a valid report. Contained at the client boundary.
    #[error("unparseable client line {line:?}: {reason}")]
    ProtocolParse { line: String, reason: String },

    #[error("container {container} exited with code {code}")]
    ContainerCrashed { container: String, code: i64 },

    #[error("failed to remove container {container}: {reason}")]
    RemovalFailure { container: String, reason: String },

    /// Every client of a continuous batch stopped reporting before its room target.
    #[error("batch {batch} stopped reporting before reaching its room target")]
    RampUpStalled { batch: u32 },

    #[error("result file: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
