//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub tcp: TcpConfig,
    pub websocket: WebSocketConfig,
    pub rpc: RpcConfig,
    pub authority: AuthorityConfig,
    pub protocol: ProtocolConfig,
    pub heartbeat: HeartbeatConfig,
    pub bucket: BucketConfig,
    pub round: RoundConfig,
    pub online: OnlineConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: default_env(),
        }
    }
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Raw TCP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TcpConfig {
    /// Bind addresses (`host:port`)
    pub bind: Vec<String>,
    /// Socket send buffer size in bytes
    pub sndbuf: u32,
    /// Socket receive buffer size in bytes
    pub rcvbuf: u32,
    /// Disable Nagle's algorithm on accepted sockets
    pub nodelay: bool,
    /// Accept loops per bind address
    pub accept: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind: vec!["0.0.0.0:3101".to_string()],
            sndbuf: 4096,
            rcvbuf: 4096,
            nodelay: true,
            accept: cpu_count(),
        }
    }
}

/// WebSocket listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Bind addresses (`host:port`); empty disables the listener
    pub bind: Vec<String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            bind: vec!["0.0.0.0:3102".to_string()],
        }
    }
}

/// Push RPC (HTTP) server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub bind: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3109".to_string(),
        }
    }
}

/// Authority tier client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// Base URL of the authority HTTP API. `None` selects the in-process token authority.
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 1000,
        }
    }
}

impl AuthorityConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Per-connection protocol settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    pub handshake_timeout_ms: u64,
    /// Client heartbeat expiry; a connection silent for this long is closed
    pub heartbeat_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Inbound ring size (rounded up to a power of two)
    pub cli_proto: usize,
    /// Outbound signal queue size
    pub svr_proto: usize,
    /// Maximum frame body size in bytes
    pub max_body: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 8_000,
            heartbeat_timeout_ms: 90_000,
            write_timeout_ms: 8_000,
            cli_proto: 5,
            svr_proto: 10,
            max_body: 4096,
        }
    }
}

impl ProtocolConfig {
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Bounds for the randomized server-side liveness renewal
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            min_secs: 600,
            max_secs: 1200,
        }
    }
}

/// Session registry sharding
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    /// Number of buckets, fixed for the process lifetime
    pub size: usize,
    /// Initial channel map capacity per bucket
    pub channel: usize,
    /// Initial room map capacity per bucket
    pub room: usize,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            size: 32,
            channel: 1024,
            room: 1024,
        }
    }
}

/// Worker round: timer wheels and buffer pools
#[derive(Debug, Clone, Deserialize)]
pub struct RoundConfig {
    pub timer: usize,
    pub timer_slots: usize,
    pub timer_tick_ms: u64,
    pub reader: usize,
    pub read_buf: usize,
    pub read_buf_size: usize,
    pub writer: usize,
    pub write_buf: usize,
    pub write_buf_size: usize,
}

impl Default for RoundConfig {
    fn default() -> Self {
        let workers = cpu_count();
        Self {
            timer: workers,
            timer_slots: 512,
            timer_tick_ms: 100,
            reader: workers,
            read_buf: 1024,
            read_buf_size: 8192,
            writer: workers,
            write_buf: 1024,
            write_buf_size: 8192,
        }
    }
}

impl RoundConfig {
    #[must_use]
    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_ms)
    }
}

/// Room occupancy aggregation loop
#[derive(Debug, Clone, Deserialize)]
pub struct OnlineConfig {
    pub tick_secs: u64,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self { tick_secs: 10 }
    }
}

impl OnlineConfig {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

// Default value functions
fn default_app_name() -> String {
    "comet".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Parse an optional variable, keeping `default` when it is unset
fn var_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(default),
    }
}

fn list_or(name: &'static str, default: Vec<String>) -> Vec<String> {
    env::var(name)
        .ok()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let tcp = TcpConfig::default();
        let ws = WebSocketConfig::default();
        let protocol = ProtocolConfig::default();
        let heartbeat = HeartbeatConfig::default();
        let bucket = BucketConfig::default();
        let round = RoundConfig::default();

        let config = Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            tcp: TcpConfig {
                bind: list_or("COMET_TCP_BIND", tcp.bind),
                sndbuf: var_or("COMET_TCP_SNDBUF", tcp.sndbuf)?,
                rcvbuf: var_or("COMET_TCP_RCVBUF", tcp.rcvbuf)?,
                nodelay: var_or("COMET_TCP_NODELAY", tcp.nodelay)?,
                accept: var_or("COMET_TCP_ACCEPT", tcp.accept)?,
            },
            websocket: WebSocketConfig {
                bind: list_or("COMET_WS_BIND", ws.bind),
            },
            rpc: RpcConfig {
                bind: env::var("COMET_RPC_BIND").unwrap_or_else(|_| RpcConfig::default().bind),
            },
            authority: AuthorityConfig {
                url: env::var("COMET_AUTHORITY_URL").ok().filter(|s| !s.is_empty()),
                timeout_ms: var_or("COMET_AUTHORITY_TIMEOUT_MS", 1000)?,
            },
            protocol: ProtocolConfig {
                handshake_timeout_ms: var_or(
                    "COMET_HANDSHAKE_TIMEOUT_MS",
                    protocol.handshake_timeout_ms,
                )?,
                heartbeat_timeout_ms: var_or(
                    "COMET_HEARTBEAT_TIMEOUT_MS",
                    protocol.heartbeat_timeout_ms,
                )?,
                write_timeout_ms: var_or("COMET_WRITE_TIMEOUT_MS", protocol.write_timeout_ms)?,
                cli_proto: var_or("COMET_CLI_PROTO", protocol.cli_proto)?,
                svr_proto: var_or("COMET_SVR_PROTO", protocol.svr_proto)?,
                max_body: var_or("COMET_MAX_BODY", protocol.max_body)?,
            },
            heartbeat: HeartbeatConfig {
                min_secs: var_or("COMET_SERVER_HEARTBEAT_MIN_SECS", heartbeat.min_secs)?,
                max_secs: var_or("COMET_SERVER_HEARTBEAT_MAX_SECS", heartbeat.max_secs)?,
            },
            bucket: BucketConfig {
                size: var_or("COMET_BUCKET_SIZE", bucket.size)?,
                channel: var_or("COMET_BUCKET_CHANNEL", bucket.channel)?,
                room: var_or("COMET_BUCKET_ROOM", bucket.room)?,
            },
            round: RoundConfig {
                timer: var_or("COMET_ROUND_TIMER", round.timer)?,
                timer_slots: var_or("COMET_ROUND_TIMER_SLOTS", round.timer_slots)?,
                timer_tick_ms: var_or("COMET_ROUND_TIMER_TICK_MS", round.timer_tick_ms)?,
                reader: var_or("COMET_ROUND_READER", round.reader)?,
                read_buf: var_or("COMET_ROUND_READ_BUF", round.read_buf)?,
                read_buf_size: var_or("COMET_ROUND_READ_BUF_SIZE", round.read_buf_size)?,
                writer: var_or("COMET_ROUND_WRITER", round.writer)?,
                write_buf: var_or("COMET_ROUND_WRITE_BUF", round.write_buf)?,
                write_buf_size: var_or("COMET_ROUND_WRITE_BUF_SIZE", round.write_buf_size)?,
            },
            online: OnlineConfig {
                tick_secs: var_or("COMET_ONLINE_TICK_SECS", OnlineConfig::default().tick_secs)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the gateway cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.size == 0 {
            return Err(ConfigError::InvalidValue("COMET_BUCKET_SIZE", "0".to_string()));
        }
        if self.round.timer == 0 || self.round.reader == 0 || self.round.writer == 0 {
            return Err(ConfigError::InvalidValue(
                "COMET_ROUND_*",
                "round sizes must be positive".to_string(),
            ));
        }
        if self.round.timer_slots == 0 || self.round.timer_tick_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "COMET_ROUND_TIMER_*",
                "timer slots and tick must be positive".to_string(),
            ));
        }
        if self.heartbeat.min_secs >= self.heartbeat.max_secs {
            return Err(ConfigError::InvalidValue(
                "COMET_SERVER_HEARTBEAT_MIN_SECS",
                format!("{} >= max {}", self.heartbeat.min_secs, self.heartbeat.max_secs),
            ));
        }
        if self.protocol.svr_proto == 0 {
            return Err(ConfigError::InvalidValue("COMET_SVR_PROTO", "0".to_string()));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
