use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Placeholder in `client.url` replaced by the server container's address.
pub const SERVER_PLACEHOLDER: &str = "{server}";

#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub results: ResultsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: i64,
    /// Pause after the server starts before any client is launched.
    #[serde(default = "default_warmup_delay_ms")]
    pub warmup_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_image")]
    pub image: String,
    /// Executable inside the client image.
    #[serde(default = "default_client_binary")]
    pub binary: String,
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Server URL template; must contain `{server}`.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_clients_per_room")]
    pub clients_per_room: u32,
    #[serde(default = "default_total_clients")]
    pub total_clients: u32,
    #[serde(default = "default_loop_delay_ms")]
    pub loop_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            memory_limit_bytes: default_memory_limit_bytes(),
            warmup_delay_ms: default_warmup_delay_ms(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            image: default_client_image(),
            binary: default_client_binary(),
            transport: default_transport(),
            url: String::new(),
            clients_per_room: default_clients_per_room(),
            total_clients: default_total_clients(),
            loop_delay_ms: default_loop_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_network_name")]
    pub name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationMode {
    /// Endless sequence of batches, each gated on the previous batch's ramp-up.
    Continuous,
    /// One population started up front and left running.
    Fixed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationConfig {
    #[serde(default = "default_mode")]
    pub mode: OrchestrationMode,
    #[serde(default = "default_one")]
    pub containers_per_batch: u32,
    /// Stop launching after this many batches (continuous mode). None = forever.
    #[serde(default)]
    pub max_batches: Option<u32>,
    #[serde(default = "default_one")]
    pub fixed_clients: u32,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            containers_per_batch: 1,
            max_batches: None,
            fixed_clients: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultsConfig {
    #[serde(default = "default_results_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_dump_interval_ms")]
    pub dump_interval_ms: u64,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            dir: default_results_dir(),
            dump_interval_ms: default_dump_interval_ms(),
        }
    }
}

fn default_memory_limit_bytes() -> i64 {
    536_870_912
}

fn default_warmup_delay_ms() -> u64 {
    1000
}

fn default_client_image() -> String {
    "rtc-mem-bench-client".into()
}

fn default_client_binary() -> String {
    "./rtc-mem-bench-client".into()
}

fn default_transport() -> String {
    "ws".into()
}

fn default_clients_per_room() -> u32 {
    8
}

fn default_total_clients() -> u32 {
    64_000
}

fn default_loop_delay_ms() -> u64 {
    1000
}

fn default_network_name() -> String {
    "rtc-mem-bench".into()
}

fn default_mode() -> OrchestrationMode {
    OrchestrationMode::Continuous
}

fn default_one() -> u32 {
    1
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_dump_interval_ms() -> u64 {
    5000
}

/// Values that take precedence over the file (from the command line).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_image: Option<String>,
    pub url: Option<String>,
    pub mode: Option<OrchestrationMode>,
}

impl BenchConfig {
    pub fn load(path: &Path, overrides: Overrides) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::load_with_overrides(&s, overrides)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        Self::load_with_overrides(s, Overrides::default())
    }

    pub fn load_with_overrides(s: &str, overrides: Overrides) -> anyhow::Result<Self> {
        let mut config: BenchConfig = toml::from_str(s)?;
        if let Some(image) = overrides.server_image {
            config.server.image = image;
        }
        if let Some(url) = overrides.url {
            config.client.url = url;
        }
        if let Some(mode) = overrides.mode {
            config.orchestration.mode = mode;
        }
        config.validate()?;
        Ok(config)
    }

    /// Rooms each client container opens: `total_clients / clients_per_room`.
    pub fn rooms_per_client(&self) -> u32 {
        self.client.total_clients / self.client.clients_per_room
    }

    /// Client argv with the server address substituted into the URL template.
    pub fn client_command(&self, server_ip: &str) -> Vec<String> {
        let url = self.client.url.replace(SERVER_PLACEHOLDER, server_ip);
        format!(
            "{} {} {} {} {} {}",
            self.client.binary,
            self.client.transport,
            url,
            self.rooms_per_client(),
            self.client.clients_per_room,
            self.client.loop_delay_ms
        )
        .split_whitespace()
        .map(str::to_string)
        .collect()
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.server.image.is_empty(), "server.image must be non-empty");
        anyhow::ensure!(
            self.server.memory_limit_bytes > 0,
            "server.memory_limit_bytes must be > 0, got {}",
            self.server.memory_limit_bytes
        );
        anyhow::ensure!(!self.client.image.is_empty(), "client.image must be non-empty");
        anyhow::ensure!(!self.client.binary.is_empty(), "client.binary must be non-empty");
        anyhow::ensure!(
            self.client.url.contains(SERVER_PLACEHOLDER),
            "client.url must contain the {} placeholder, got {:?}",
            SERVER_PLACEHOLDER,
            self.client.url
        );
        anyhow::ensure!(
            self.client.clients_per_room > 0,
            "client.clients_per_room must be > 0, got {}",
            self.client.clients_per_room
        );
        anyhow::ensure!(
            self.client.total_clients >= self.client.clients_per_room,
            "client.total_clients must be >= client.clients_per_room, got {} < {}",
            self.client.total_clients,
            self.client.clients_per_room
        );
        anyhow::ensure!(!self.network.name.is_empty(), "network.name must be non-empty");
        anyhow::ensure!(
            self.orchestration.containers_per_batch > 0,
            "orchestration.containers_per_batch must be > 0, got {}",
            self.orchestration.containers_per_batch
        );
        anyhow::ensure!(
            self.orchestration.max_batches != Some(0),
            "orchestration.max_batches must be > 0 when set"
        );
        anyhow::ensure!(
            self.orchestration.fixed_clients > 0,
            "orchestration.fixed_clients must be > 0, got {}",
            self.orchestration.fixed_clients
        );
        anyhow::ensure!(
            self.results.dump_interval_ms > 0,
            "results.dump_interval_ms must be > 0, got {}",
            self.results.dump_interval_ms
        );
        Ok(())
    }
}
