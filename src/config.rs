use std::time::Duration;

use serde::Deserialize;

use crate::poller::RetryPolicy;
use crate::session::SessionManagerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub tick_interval_ms: u64,
    /// Upper bound on one GET /data round trip.
    pub fetch_timeout_ms: u64,
    /// Longest run a client may request.
    pub max_duration_secs: u64,
    /// Fetch failures tolerated in a row before the run is cancelled. 0 = first failure is fatal.
    pub max_consecutive_failures: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            fetch_timeout_ms: 2000,
            max_duration_secs: 3600,
            max_consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Stored rows loaded into the buffer at login.
    pub history_seed_limit: u32,
    /// Readings kept in the /ws/session broadcast channel (slow clients may lag).
    pub live_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_seed_limit: 100,
            live_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    pub admin_usernames: Vec<String>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn session_manager_config(&self) -> SessionManagerConfig {
        SessionManagerConfig {
            tick_interval: Duration::from_millis(self.polling.tick_interval_ms),
            fetch_timeout: Duration::from_millis(self.polling.fetch_timeout_ms),
            max_duration_secs: self.polling.max_duration_secs,
            retry: RetryPolicy {
                max_consecutive_failures: self.polling.max_consecutive_failures,
            },
            history_seed_limit: self.session.history_seed_limit,
            live_channel_capacity: self.session.live_channel_capacity,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.polling.tick_interval_ms > 0,
            "polling.tick_interval_ms must be > 0, got {}",
            self.polling.tick_interval_ms
        );
        anyhow::ensure!(
            self.polling.fetch_timeout_ms > 0,
            "polling.fetch_timeout_ms must be > 0, got {}",
            self.polling.fetch_timeout_ms
        );
        anyhow::ensure!(
            self.polling.max_duration_secs > 0,
            "polling.max_duration_secs must be > 0, got {}",
            self.polling.max_duration_secs
        );
        anyhow::ensure!(
            self.session.live_channel_capacity > 0,
            "session.live_channel_capacity must be > 0, got {}",
            self.session.live_channel_capacity
        );
        anyhow::ensure!(
            self.accounts
                .admin_usernames
                .iter()
                .all(|u| !u.trim().is_empty()),
            "accounts.admin_usernames must not contain empty names"
        );
        Ok(())
    }
}
