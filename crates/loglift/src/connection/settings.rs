//! 🔧 Connection settings: the raw knobs from config, the validated snapshot, and the
//! mutable transport settings that `Auth` gets to scribble on before the client is born.
//!
//! 🧠 Knowledge graph:
//! - `ConnectionSettings`: serde-facing, loose, full of defaults. What the TOML said.
//! - `ConnectionConfig`: validated once, immutable forever. What we actually believe.
//! - `TransportSettings`: derived from `ConnectionConfig` right before client creation,
//!   handed to `Auth::configure` by `&mut`, then consumed by the client provider.
//!   Nobody looks at it again. It lives a short, meaningful life. Like a mayfly. 🦆

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::auth::{Auth, AuthSettings};
use crate::connection::endpoints::{ServerEndpoint, parse_server_list};
use crate::error::ConfigurationError;

/// 🎭 Which transport family the factory should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Http,
    FramedTcp,
}

/// 📋 Connection knobs as they appear in config. Defaults mirror what ops has run for years.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub transport: TransportKind,
    /// 📡 Semicolon-delimited, e.g. `"http://a:9200;http://b:9200"`.
    pub server_uris: String,
    /// ⏱️ Milliseconds. `-1` means "whatever the transport thinks is reasonable".
    #[serde(default = "transport_default_timeout")]
    pub connect_timeout_ms: i64,
    #[serde(default = "transport_default_timeout")]
    pub read_timeout_ms: i64,
    #[serde(default = "default_max_total_connections")]
    pub max_total_connections: usize,
    #[serde(default = "default_max_connections_per_route")]
    pub max_connections_per_route: usize,
    /// 🧵 `None` means one per CPU.
    #[serde(default)]
    pub io_thread_count: Option<usize>,
    #[serde(default)]
    pub discovery_enabled: bool,
    #[serde(default)]
    pub compression: bool,
    #[serde(default)]
    pub auth: Option<AuthSettings>,
}

fn transport_default_timeout() -> i64 {
    -1
}

fn default_max_total_connections() -> usize {
    40
}

fn default_max_connections_per_route() -> usize {
    4
}

/// 🧵 One I/O thread per CPU, or one if the OS is being coy about its CPUs.
pub fn default_io_thread_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl ConnectionSettings {
    pub fn new(server_uris: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::default(),
            server_uris: server_uris.into(),
            connect_timeout_ms: transport_default_timeout(),
            read_timeout_ms: transport_default_timeout(),
            max_total_connections: default_max_total_connections(),
            max_connections_per_route: default_max_connections_per_route(),
            io_thread_count: None,
            discovery_enabled: false,
            compression: false,
            auth: None,
        }
    }
}

/// 🔒 The validated, immutable connection snapshot. Captured once, never mutated.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    servers: Vec<ServerEndpoint>,
    connect_timeout_ms: i64,
    read_timeout_ms: i64,
    max_total_connections: usize,
    max_connections_per_route: usize,
    io_thread_count: usize,
    discovery_enabled: bool,
    compression: bool,
    auth: Option<Arc<dyn Auth>>,
}

impl ConnectionConfig {
    /// 🚀 All defaults, just the server list. The "I just want it to work" constructor.
    pub fn new(server_uris: &str) -> Result<Self, ConfigurationError> {
        Self::from_settings(ConnectionSettings::new(server_uris))
    }

    /// 🔍 Validates raw settings into a config. Every check happens here, exactly once.
    pub fn from_settings(settings: ConnectionSettings) -> Result<Self, ConfigurationError> {
        let servers = parse_server_list(&settings.server_uris)?;
        let connect_timeout_ms = validate_timeout("connect_timeout_ms", settings.connect_timeout_ms)?;
        let read_timeout_ms = validate_timeout("read_timeout_ms", settings.read_timeout_ms)?;
        let max_total_connections =
            validate_positive("max_total_connections", settings.max_total_connections)?;
        let max_connections_per_route =
            validate_positive("max_connections_per_route", settings.max_connections_per_route)?;
        let io_thread_count = validate_positive(
            "io_thread_count",
            settings.io_thread_count.unwrap_or_else(default_io_thread_count),
        )?;
        let auth = settings.auth.map(AuthSettings::into_auth).transpose()?;

        Ok(Self {
            servers,
            connect_timeout_ms,
            read_timeout_ms,
            max_total_connections,
            max_connections_per_route,
            io_thread_count,
            discovery_enabled: settings.discovery_enabled,
            compression: settings.compression,
            auth,
        })
    }

    /// 🔒 Same config, plus an auth capability. Returns a new value; the old one is untouched.
    pub fn with_auth(mut self, auth: Arc<dyn Auth>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn servers(&self) -> &[ServerEndpoint] {
        &self.servers
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis_to_duration(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis_to_duration(self.read_timeout_ms)
    }

    pub fn max_total_connections(&self) -> usize {
        self.max_total_connections
    }

    pub fn max_connections_per_route(&self) -> usize {
        self.max_connections_per_route
    }

    pub fn io_thread_count(&self) -> usize {
        self.io_thread_count
    }

    pub fn discovery_enabled(&self) -> bool {
        self.discovery_enabled
    }

    pub fn compression(&self) -> bool {
        self.compression
    }

    pub fn auth(&self) -> Option<&Arc<dyn Auth>> {
        self.auth.as_ref()
    }
}

fn validate_timeout(name: &'static str, value: i64) -> Result<i64, ConfigurationError> {
    if value < -1 {
        return Err(ConfigurationError::InvalidSetting {
            name,
            reason: format!("{value} is neither -1 (transport default) nor a non-negative number of milliseconds"),
        });
    }
    Ok(value)
}

fn validate_positive(name: &'static str, value: usize) -> Result<usize, ConfigurationError> {
    if value == 0 {
        return Err(ConfigurationError::InvalidSetting {
            name,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

fn millis_to_duration(value: i64) -> Option<Duration> {
    u64::try_from(value).ok().map(Duration::from_millis)
}

/// 🔑 Credentials that travel with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credentials {
    Basic {
        username: String,
        password: Option<String>,
    },
    ApiKey(String),
}

/// ✏️ The transport config "builder" that `Auth::configure` edits in place.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub endpoints: Vec<ServerEndpoint>,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub max_total_connections: usize,
    pub max_connections_per_route: usize,
    pub discovery_enabled: bool,
    pub compression: bool,
    pub credentials: Option<Credentials>,
    pub headers: Vec<(String, String)>,
    pub accept_invalid_certs: bool,
}

impl TransportSettings {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            endpoints: config.servers().to_vec(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            max_total_connections: config.max_total_connections(),
            max_connections_per_route: config.max_connections_per_route(),
            discovery_enabled: config.discovery_enabled(),
            compression: config.compression(),
            credentials: None,
            headers: Vec::new(),
            accept_invalid_certs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_defaults_match_what_ops_has_run_for_years() {
        let config = ConnectionConfig::new("http://localhost:9200").unwrap();
        assert_eq!(config.max_total_connections(), 40);
        assert_eq!(config.max_connections_per_route(), 4);
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(config.read_timeout(), None);
        assert!(!config.discovery_enabled());
        assert!(config.io_thread_count() >= 1);
        assert!(config.auth().is_none());
    }

    #[test]
    fn the_one_where_timeouts_below_minus_one_are_rejected() {
        let mut settings = ConnectionSettings::new("http://localhost:9200");
        settings.read_timeout_ms = -7;
        let err = ConnectionConfig::from_settings(settings).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidSetting { name: "read_timeout_ms", .. }));
    }

    #[test]
    fn the_one_where_zero_connections_is_not_a_pool() {
        let mut settings = ConnectionSettings::new("http://localhost:9200");
        settings.max_total_connections = 0;
        assert!(ConnectionConfig::from_settings(settings).is_err());
    }

    #[test]
    fn the_one_where_transport_settings_inherit_the_snapshot() {
        let mut settings = ConnectionSettings::new("http://a:9200;http://b:9200");
        settings.connect_timeout_ms = 250;
        let config = ConnectionConfig::from_settings(settings).unwrap();

        let transport = TransportSettings::from_config(&config);
        assert_eq!(transport.endpoints.len(), 2);
        assert_eq!(transport.connect_timeout, Some(Duration::from_millis(250)));
        assert_eq!(transport.read_timeout, None);
        assert!(transport.credentials.is_none());
    }
}
