//! Configuration structs

mod app_config;

pub use app_config::{
    AppConfig, AppSettings, AuthorityConfig, BucketConfig, ConfigError, Environment,
    HeartbeatConfig, OnlineConfig, ProtocolConfig, RoundConfig, RpcConfig, TcpConfig,
    WebSocketConfig,
};
