use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main gateway settings, loaded from TOML at startup. The ruleset itself
/// lives in the rule store and is refreshed through the config cache; these
/// settings only shape the process.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Address and port the gateway listens on
    /// Example: "0.0.0.0:8080"
    pub listen: SocketAddr,
    /// Origin server requests are forwarded to, as host:port
    pub origin: String,
    /// Admin/observability listener (rule CRUD, /metrics)
    /// Default: None (admin API disabled)
    #[serde(default)]
    pub admin_listen: Option<SocketAddr>,
    /// Path answering rate-limit introspection requests.
    /// Overridable with the RATE_LIMIT_INFO_PATH environment variable.
    #[serde(default = "default_info_path")]
    pub rate_limit_info_path: String,
    /// Optional JSON file seeding the rule store at startup
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_info_path() -> String {
    "/rate-limit-info".to_string()
}

/// Ruleset snapshot refresh policy
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CacheConfig {
    /// Seconds a snapshot is served before a read-through refresh
    /// Default: 60
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: default_ttl_secs() }
    }
}

fn default_ttl_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LimitsConfig {
    /// How much of the request body is buffered and shared with the
    /// fingerprint, matching, and forwarding stages
    /// Default: 524288 (512 KiB)
    #[serde(default = "default_body_buffer_bytes")]
    pub body_buffer_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { body_buffer_bytes: default_body_buffer_bytes() }
    }
}

fn default_body_buffer_bytes() -> usize {
    512 * 1024
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Log level filter, overridable with RUST_LOG
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Include the module target in log lines
    #[serde(default)]
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), show_target: false }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
