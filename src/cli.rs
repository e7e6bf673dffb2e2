// Command line: where the config lives, plus the overrides an operator changes per run.

use crate::config::{OrchestrationMode, Overrides};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "rtc-mem-bench", version, about = "Measure how a real-time server scales with connected clients")]
pub struct Cli {
    /// TOML run configuration.
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// Server image under test.
    #[arg(short, long)]
    pub server_image: Option<String>,

    /// Server URL; use {server} as a placeholder for the server address.
    #[arg(long)]
    pub url: Option<String>,

    /// Orchestration strategy.
    #[arg(long, value_enum)]
    pub mode: Option<OrchestrationMode>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            server_image: self.server_image.clone(),
            url: self.url.clone(),
            mode: self.mode,
        }
    }
}
