//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Poll lifecycle and voting configuration.
    #[serde(default)]
    pub polls: PollsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Poll lifecycle and voting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollsConfig {
    /// Upper bound for the atomic check-and-insert of a vote, in milliseconds.
    #[serde(default = "default_vote_timeout_ms")]
    pub vote_timeout_ms: u64,
    /// How often the background sweep closes expired room polls, in seconds.
    /// Zero disables the sweep; expiry is then only applied on access.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Per-viewer event buffer. Events beyond it are dropped for that viewer.
    #[serde(default = "default_viewer_buffer")]
    pub viewer_buffer: usize,
    /// Longest accepted room poll duration.
    #[serde(default = "default_max_duration_minutes")]
    pub max_duration_minutes: i32,
}

impl PollsConfig {
    /// Vote timeout as a [`Duration`].
    #[must_use]
    pub const fn vote_timeout(&self) -> Duration {
        Duration::from_millis(self.vote_timeout_ms)
    }

    /// Sweep interval, or `None` when the sweep is disabled.
    #[must_use]
    pub const fn sweep_interval(&self) -> Option<Duration> {
        if self.sweep_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sweep_interval_secs))
        }
    }
}

impl Default for PollsConfig {
    fn default() -> Self {
        Self {
            vote_timeout_ms: default_vote_timeout_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            viewer_buffer: default_viewer_buffer(),
            max_duration_minutes: default_max_duration_minutes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_vote_timeout_ms() -> u64 {
    5_000
}

const fn default_sweep_interval_secs() -> u64 {
    15
}

const fn default_viewer_buffer() -> usize {
    64
}

const fn default_max_duration_minutes() -> i32 {
    7 * 24 * 60
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, into the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `POLLHUB_ENV`)
    /// 4. Environment variables with `POLLHUB_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("POLLHUB_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("POLLHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("POLLHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_polls_config_defaults() {
        let polls = PollsConfig::default();
        assert_eq!(polls.vote_timeout(), Duration::from_secs(5));
        assert_eq!(polls.sweep_interval(), Some(Duration::from_secs(15)));
        assert_eq!(polls.viewer_buffer, 64);
    }

    #[test]
    fn test_zero_sweep_interval_disables_sweep() {
        let polls = PollsConfig {
            sweep_interval_secs: 0,
            ..PollsConfig::default()
        };
        assert!(polls.sweep_interval().is_none());
    }

    #[test]
    fn test_deserialize_with_missing_polls_section() {
        let raw = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080

                [database]
                url = "postgres://localhost/pollhub"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let config: Config = raw.try_deserialize().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.max_connections, 100);
        assert_eq!(config.polls.sweep_interval_secs, 15);
    }
}
