use anyhow::Result;
use clap::Parser;
use rtc_mem_bench::cli::Cli;
use rtc_mem_bench::config::BenchConfig;
use rtc_mem_bench::orchestrator::Benchmark;
use rtc_mem_bench::runtime::DockerRuntime;
use rtc_mem_bench::session::Session;
use rtc_mem_bench::shutdown::{self, Outcome};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

// Single execution context: stream callbacks and the dumper interleave but never run in parallel.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    let config = BenchConfig::load(&cli.config, cli.overrides())?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        server_image = %config.server.image,
        client_image = %config.client.image,
        network = %config.network.name,
        mode = ?config.orchestration.mode,
        "starting benchmark"
    );

    let runtime = DockerRuntime::connect()?;
    runtime.ping().await?;
    let session = Arc::new(Session::new(Arc::new(runtime)));
    let bench = Benchmark::new(config, session.clone());
    tracing::info!(path = %bench.result_path().display(), "results file");

    match shutdown::supervise(&session, bench.run(), shutdown::interrupt_signal()).await {
        Outcome::Failed(e) => Err(e.into()),
        outcome => Ok(ExitCode::from(outcome.exit_code())),
    }
}
