use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Command-line flags. Only flags the user actually passed are serialized, so
/// an unset flag never masks a value from the TOML file or the environment.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "syncphoto-server", version, about = "SyncPhoto pairing and capture server")]
pub struct Cli {
    /// Port to listen on [default: 8080]
    #[arg(long, env = "SYNCPHOTO_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "SYNCPHOTO_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./syncphoto.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys) [default: ./data]
    #[arg(long, env = "SYNCPHOTO_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    #[serde(default)]
    pub generate_config: bool,
    pub data_dir: String,

    /// Connection registry and notifier tuning ([realtime] in TOML)
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Object storage for photo uploads ([storage] in TOML)
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Tuning for live connections and presence dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Frames buffered per connection before senders stall (default: 32)
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// A send stalled longer than this counts as a write failure (default: 10000)
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Server keepalive ping interval (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Pong deadline after each ping (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,

    /// Presence notifier worker count (default: 4)
    #[serde(default = "default_presence_workers")]
    pub presence_workers: usize,

    /// Pending presence events per worker (default: 256)
    #[serde(default = "default_presence_queue")]
    pub presence_queue: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            send_timeout_ms: default_send_timeout_ms(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            presence_workers: default_presence_workers(),
            presence_queue: default_presence_queue(),
        }
    }
}

impl RealtimeConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs.max(1))
    }
}

fn default_outbound_buffer() -> usize {
    32
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

fn default_presence_workers() -> usize {
    4
}

fn default_presence_queue() -> usize {
    256
}

/// S3-compatible bucket that clients upload photos to directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket name
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Signing region (default: "us-east-1")
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for non-AWS providers, e.g. "https://s3.example.net".
    /// Path-style URLs are used when set.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: String,

    /// Lifetime of presigned upload URLs (default: 300)
    #[serde(default = "default_upload_expiry")]
    pub upload_expiry_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            upload_expiry_secs: default_upload_expiry(),
        }
    }
}

fn default_bucket() -> String {
    "syncphoto".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_upload_expiry() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            config: "./syncphoto.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            realtime: RealtimeConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (SYNCPHOTO_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Cli::parse();
        let file = Toml::file(&cli.config);
        Self::layered(file, cli)
    }

    fn layered(file: impl Provider, cli: Cli) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("SYNCPHOTO_").split("__"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# SyncPhoto Server Configuration
# Place this file at ./syncphoto.toml or specify with --config <path>
# All settings can be overridden via environment variables (SYNCPHOTO_PORT,
# SYNCPHOTO_REALTIME__SEND_TIMEOUT_MS, ...) or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and JWT signing key
# data_dir = "./data"

# ---- Live connections ----
# [realtime]
# outbound_buffer = 32        # frames queued per connection before senders stall
# send_timeout_ms = 10000     # stalled send counts as a broken connection
# ping_interval_secs = 30
# pong_timeout_secs = 10
# presence_workers = 4
# presence_queue = 256        # pending presence events per worker

# ---- Photo uploads ----
# [storage]
# bucket = "syncphoto"
# region = "us-east-1"
# endpoint = ""               # set for S3-compatible providers (path-style URLs)
# access_key = ""
# secret_key = ""
# upload_expiry_secs = 300
"#
    .to_string()
}
