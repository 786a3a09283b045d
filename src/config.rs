//! Configuration module for cache-harness.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the harness
#[derive(Parser, Debug)]
#[command(name = "cache-harness")]
#[command(author = "cache-harness authors")]
#[command(version = "0.1.0")]
#[command(about = "Load harness and bootstrapper for memcached-compatible servers", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Harness subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Drive `stats cachedump` requests against a running server, then shut it down
    Client {
        /// Server host name
        host: String,
        /// Server port
        port: u16,
        /// Run time in seconds
        runtime_secs: u64,
        /// Delay between requests in microseconds
        delay_us: u64,
    },
    /// Launch a server on an ephemeral port and report the port it bound
    Launch {
        /// `<ttl-secs>` or `<threads> <ttl-secs>`
        #[arg(num_args = 1..=2, required = true, value_names = ["THREADS", "TTL_SECS"])]
        args: Vec<u64>,

        /// Launch the server as a daemon writing a pid file
        #[arg(short, long)]
        daemon: bool,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub client: ClientToml,
    #[serde(default)]
    pub launcher: LauncherToml,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientToml {
    /// Line buffer capacity for responses
    #[serde(default = "default_max_line")]
    pub max_line: usize,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Log progress every N completed requests (0 disables)
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
    /// Disable Nagle's algorithm on the client socket
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

impl Default for ClientToml {
    fn default() -> Self {
        Self {
            max_line: default_max_line(),
            connect_timeout_ms: default_connect_timeout_ms(),
            progress_every: default_progress_every(),
            nodelay: true,
        }
    }
}

/// Launcher-related configuration
#[derive(Debug, Deserialize)]
pub struct LauncherToml {
    /// Server executable
    #[serde(default = "default_server_binary")]
    pub server_binary: PathBuf,
    /// Wrapper enforcing the server's time to live (empty disables)
    #[serde(default = "default_timeout_wrapper")]
    pub timeout_wrapper: String,
    /// Directory holding the port and pid rendezvous files
    #[serde(default = "default_rendezvous_dir")]
    pub rendezvous_dir: PathBuf,
    /// Environment variable naming the port announcement file
    #[serde(default = "default_port_env")]
    pub port_env: String,
    /// Upper bound on each rendezvous wait, in seconds
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Reads attempted while the pid file is still empty
    #[serde(default = "default_pid_read_retries")]
    pub pid_read_retries: u32,
    /// First poll interval in microseconds
    #[serde(default = "default_poll_initial_us")]
    pub poll_initial_us: u64,
    /// Poll interval ceiling in milliseconds
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,
}

impl Default for LauncherToml {
    fn default() -> Self {
        Self {
            server_binary: default_server_binary(),
            timeout_wrapper: default_timeout_wrapper(),
            rendezvous_dir: default_rendezvous_dir(),
            port_env: default_port_env(),
            wait_timeout_secs: default_wait_timeout_secs(),
            pid_read_retries: default_pid_read_retries(),
            poll_initial_us: default_poll_initial_us(),
            poll_max_ms: default_poll_max_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_line() -> usize {
    1024
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_progress_every() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_server_binary() -> PathBuf {
    PathBuf::from("./memcached")
}

fn default_timeout_wrapper() -> String {
    "./timedrun".to_string()
}

fn default_rendezvous_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_port_env() -> String {
    "MEMCACHED_PORT_FILENAME".to_string()
}

fn default_wait_timeout_secs() -> u64 {
    30
}

fn default_pid_read_retries() -> u32 {
    20
}

fn default_poll_initial_us() -> u64 {
    10
}

fn default_poll_max_ms() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved settings for the request loop client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub runtime: Duration,
    pub delay: Duration,
    pub max_line: usize,
    pub connect_timeout: Duration,
    pub progress_every: u64,
    pub nodelay: bool,
}

/// Resolved settings for the server launcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub server_binary: PathBuf,
    pub timeout_wrapper: Option<PathBuf>,
    pub ttl_secs: u64,
    pub threads: Option<u64>,
    pub daemon: bool,
    pub rendezvous_dir: PathBuf,
    pub port_env: String,
    pub wait_timeout: Duration,
    pub pid_read_retries: u32,
    pub poll_initial: Duration,
    pub poll_max: Duration,
}

/// What the harness was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Client(ClientConfig),
    Launch(LaunchConfig),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve already-parsed CLI arguments against the optional TOML file.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let mode = match cli.command {
            Command::Client {
                host,
                port,
                runtime_secs,
                delay_us,
            } => {
                let client = toml_config.client;
                if client.max_line < 2 {
                    return Err(ConfigError::Invalid(format!(
                        "client.max_line must be at least 2, got {}",
                        client.max_line
                    )));
                }
                Mode::Client(ClientConfig {
                    host,
                    port,
                    runtime: Duration::from_secs(runtime_secs),
                    delay: Duration::from_micros(delay_us),
                    max_line: client.max_line,
                    connect_timeout: Duration::from_millis(client.connect_timeout_ms),
                    progress_every: client.progress_every,
                    nodelay: client.nodelay,
                })
            }
            Command::Launch { args, daemon } => {
                let (threads, ttl_secs) = match args.as_slice() {
                    [ttl] => (None, *ttl),
                    [threads, ttl] => (Some(*threads), *ttl),
                    _ => {
                        return Err(ConfigError::Invalid(
                            "launch takes <ttl-secs> or <threads> <ttl-secs>".to_string(),
                        ))
                    }
                };
                if threads == Some(0) {
                    return Err(ConfigError::Invalid(
                        "launch thread count must be at least 1".to_string(),
                    ));
                }
                let launcher = toml_config.launcher;
                Mode::Launch(LaunchConfig {
                    server_binary: launcher.server_binary,
                    timeout_wrapper: if launcher.timeout_wrapper.is_empty() {
                        None
                    } else {
                        Some(PathBuf::from(launcher.timeout_wrapper))
                    },
                    ttl_secs,
                    threads,
                    daemon,
                    rendezvous_dir: launcher.rendezvous_dir,
                    port_env: launcher.port_env,
                    wait_timeout: Duration::from_secs(launcher.wait_timeout_secs),
                    pid_read_retries: launcher.pid_read_retries,
                    poll_initial: Duration::from_micros(launcher.poll_initial_us),
                    poll_max: Duration::from_millis(launcher.poll_max_ms),
                })
            }
        };

        Ok(Config {
            mode,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
