// Shutdown coordination: whatever ends the run (server exit, infrastructure error,
// operator interrupt), every registered container is removed exactly once.

use crate::error::BenchError;
use crate::session::Session;
use std::convert::Infallible;
use std::future::Future;

/// Why the run ended.
#[derive(Debug)]
pub enum Outcome {
    /// Ctrl-C / SIGTERM.
    Interrupted,
    /// The server container exited; carries its status code.
    ServerExited(i64),
    /// Infrastructure failure; re-raised by the binary after cleanup.
    Failed(BenchError),
}

impl Outcome {
    /// Process exit status: the low byte of the server's own code when it exited, 0 on
    /// interrupt. A non-zero server status never maps to 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Interrupted => 0,
            Outcome::ServerExited(0) => 0,
            Outcome::ServerExited(code) => match (*code & 0xff) as u8 {
                0 => 1,
                low => low,
            },
            Outcome::Failed(_) => 1,
        }
    }
}

/// Races the benchmark against the interrupt signal, then tears down every container
/// the session registered. An interrupt before anything was started skips cleanup.
pub async fn supervise<R, S>(session: &Session, run: R, interrupt: S) -> Outcome
where
    R: Future<Output = Result<Infallible, BenchError>>,
    S: Future<Output = ()>,
{
    let outcome = tokio::select! {
        result = run => match result {
            Err(BenchError::ContainerCrashed { code, .. }) => Outcome::ServerExited(code),
            Err(e) => {
                tracing::error!(error = %e, "benchmark failed");
                Outcome::Failed(e)
            }
        },
        _ = interrupt => {
            tracing::info!("Received shutdown signal");
            if !session.has_started_containers() {
                tracing::info!("nothing started, skipping cleanup");
                return Outcome::Interrupted;
            }
            Outcome::Interrupted
        }
    };

    let report = session.cleanup().await;
    tracing::info!(
        removed = report.removed,
        failed = report.failed,
        "cleanup complete"
    );
    outcome
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn interrupt_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
