use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub query: QueryConfig,
    /// Absent section means readings are not forwarded anywhere.
    pub reporting: Option<ReportingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP server to listen on
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3000)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryConfig {
    #[default]
    Memory,
    Sqlite {
        path: PathBuf,
        /// Upper bound on waiting for a pooled connection
        #[serde(default = "default_acquire_timeout_secs")]
        acquire_timeout_secs: u64,
    },
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    /// A unix timestamp is appended so restarts never collide on the broker
    pub client_id_prefix: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_secs: u64,
    /// Payloads buffered between the subscriber and the ingest loop
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            topic: "production/mdcw".to_string(),
            client_id_prefix: "forming-subscriber".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_secs: 5,
            channel_capacity: 256,
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Row cap for views without a date range
    pub recent_limit: usize,
    /// Row cap when a date range is given
    pub range_limit: usize,
    pub skip_log_limit: usize,
    /// IANA zone used to turn calendar dates into instants. `None` uses the
    /// system zone.
    pub timezone: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            recent_limit: 100,
            range_limit: 1000,
            skip_log_limit: 100,
            timezone: None,
        }
    }
}

impl QueryConfig {
    pub fn time_zone(&self) -> Result<jiff::tz::TimeZone, jiff::Error> {
        match self.timezone.as_deref() {
            Some(name) => jiff::tz::TimeZone::get(name),
            None => Ok(jiff::tz::TimeZone::system()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    /// Base64-encoded service account key
    pub credentials_base64: Option<String>,
    /// Path to a service account key file, used when no base64 key is set
    pub credentials_path: Option<PathBuf>,
    pub spreadsheet_id: Option<String>,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default = "default_report_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_sheet_name() -> String {
    "Production Data".to_string()
}

fn default_report_timeout_secs() -> u64 {
    10
}

impl ReportingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Bound on a single forwarding attempt.
    pub fn report_timeout(&self) -> Duration {
        let secs = self
            .reporting
            .as_ref()
            .map_or_else(default_report_timeout_secs, |r| r.timeout_secs);
        Duration::from_secs(secs)
    }
}
