//! Daemon configuration.
//!
//! Priority (highest to lowest): CLI / env var > TOML file > built-in
//! default. The TOML file has `[server]` and `[security]` sections; every
//! field is an optional override.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8002;
const DEFAULT_WEBSOCKET_PATH: &str = "/ws";
const DEFAULT_MAX_CONNECTIONS: usize = 1000;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 1;
const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
const DEFAULT_PONG_WAIT_SECS: u64 = 60;
const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;
const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
const DEFAULT_WRITE_BUFFER_SIZE: usize = 4096;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CLIENT_CLEANUP_TIMEOUT_SECS: u64 = 5;

// ─── TOML config file ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    server: TomlServer,
    #[serde(default)]
    security: TomlSecurity,
}

#[derive(Debug, Deserialize, Default)]
struct TomlServer {
    host: Option<String>,
    port: Option<u16>,
    websocket_path: Option<String>,
    max_connections: Option<usize>,
    read_timeout: Option<u64>,
    write_timeout: Option<u64>,
    ping_interval: Option<u64>,
    pong_wait: Option<u64>,
    max_message_size: Option<usize>,
    read_buffer_size: Option<usize>,
    write_buffer_size: Option<usize>,
    shutdown_timeout: Option<u64>,
    client_cleanup_timeout: Option<u64>,
    /// Absolute connection lifetime cap in seconds; 0 disables it.
    auto_close_after: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSecurity {
    jwt_secret_key: Option<String>,
}

fn load_toml(path: &Path) -> Option<TomlConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config file — using defaults");
            None
        }
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub websocket_path: String,
    pub max_connections: usize,
    /// Budget for the upgrade handshake and first-frame wait. Steady-state
    /// liveness is the ping/pong discipline, not this.
    pub read_timeout: Duration,
    /// Per-frame write budget; a stalled socket is closed, not waited on.
    pub write_timeout: Duration,
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub max_message_size: usize,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub shutdown_timeout: Duration,
    pub client_cleanup_timeout: Duration,
    /// Absolute connection lifetime cap; `None` means unlimited.
    pub auto_close_after: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// HMAC key for bearer-token verification.
    pub jwt_secret_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub security: SecurityConfig,
}

/// CLI / env overrides, passed from clap. `None` falls through to the TOML
/// layer and then to the built-in default.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub jwt_secret_key: Option<String>,
}

impl Config {
    pub fn new(config_file: Option<&Path>, overrides: Overrides) -> Self {
        let toml = config_file.and_then(load_toml).unwrap_or_default();

        let auto_close_after = toml
            .server
            .auto_close_after
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        Self {
            server: ServerConfig {
                host: overrides
                    .host
                    .or(toml.server.host)
                    .unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: overrides.port.or(toml.server.port).unwrap_or(DEFAULT_PORT),
                websocket_path: toml
                    .server
                    .websocket_path
                    .unwrap_or_else(|| DEFAULT_WEBSOCKET_PATH.to_string()),
                max_connections: toml
                    .server
                    .max_connections
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS),
                read_timeout: Duration::from_secs(
                    toml.server.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
                ),
                write_timeout: Duration::from_secs(
                    toml.server
                        .write_timeout
                        .unwrap_or(DEFAULT_WRITE_TIMEOUT_SECS),
                ),
                ping_interval: Duration::from_secs(
                    toml.server
                        .ping_interval
                        .unwrap_or(DEFAULT_PING_INTERVAL_SECS),
                ),
                pong_wait: Duration::from_secs(
                    toml.server.pong_wait.unwrap_or(DEFAULT_PONG_WAIT_SECS),
                ),
                max_message_size: toml
                    .server
                    .max_message_size
                    .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE),
                read_buffer_size: toml
                    .server
                    .read_buffer_size
                    .unwrap_or(DEFAULT_READ_BUFFER_SIZE),
                write_buffer_size: toml
                    .server
                    .write_buffer_size
                    .unwrap_or(DEFAULT_WRITE_BUFFER_SIZE),
                shutdown_timeout: Duration::from_secs(
                    toml.server
                        .shutdown_timeout
                        .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                ),
                client_cleanup_timeout: Duration::from_secs(
                    toml.server
                        .client_cleanup_timeout
                        .unwrap_or(DEFAULT_CLIENT_CLEANUP_TIMEOUT_SECS),
                ),
                auto_close_after,
            },
            security: SecurityConfig {
                jwt_secret_key: overrides
                    .jwt_secret_key
                    .or(toml.security.jwt_secret_key)
                    .unwrap_or_default(),
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None, Overrides::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8002");
        assert_eq!(cfg.server.websocket_path, "/ws");
        assert_eq!(cfg.server.max_connections, 1000);
        assert_eq!(cfg.server.ping_interval, Duration::from_secs(30));
        assert_eq!(cfg.server.pong_wait, Duration::from_secs(60));
        assert_eq!(cfg.server.max_message_size, 1024 * 1024);
        assert!(cfg.server.auto_close_after.is_none());
    }

    #[test]
    fn cli_overrides_beat_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 9000\nhost = \"10.0.0.1\"\n\n[security]\njwt_secret_key = \"from-toml\""
        )
        .unwrap();

        let cfg = Config::new(
            Some(file.path()),
            Overrides {
                port: Some(9999),
                ..Default::default()
            },
        );
        assert_eq!(cfg.server.port, 9999, "CLI wins over TOML");
        assert_eq!(cfg.server.host, "10.0.0.1", "TOML wins over default");
        assert_eq!(cfg.security.jwt_secret_key, "from-toml");
    }

    #[test]
    fn zero_auto_close_means_disabled() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nauto_close_after = 0").unwrap();
        let cfg = Config::new(Some(file.path()), Overrides::default());
        assert!(cfg.server.auto_close_after.is_none());
    }

    #[test]
    fn unparseable_toml_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml {{").unwrap();
        let cfg = Config::new(Some(file.path()), Overrides::default());
        assert_eq!(cfg.server.port, 8002);
    }
}
