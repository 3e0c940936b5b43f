use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub platform: PlatformConfig,
    pub protocol: ProtocolConfig,
    pub registry: RegistryConfig,
    pub scheduler: SchedulerConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Human readable platform name
    pub name: String,
    pub version: String,
    pub description: String,
    /// Identifier sent as `source_agent` in every task envelope
    pub source_agent: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: "Switchboard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "A2A agent coordination platform".to_string(),
            source_agent: "switchboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Wire protocol version placed in the envelope header
    pub version: String,
    /// Timeout for card fetch, task submit and status calls (ms)
    pub request_timeout_ms: u64,
    /// Timeout for health pings (ms)
    pub health_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            request_timeout_ms: 30_000,
            health_timeout_ms: 10_000,
            user_agent: concat!("switchboard/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ProtocolConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

/// Records not refreshed within this many agent timeouts are evicted
pub const STALENESS_MULTIPLIER: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Per-agent timeout (ms); the staleness window is 3x this value
    pub agent_timeout_ms: u64,
    /// Interval between health sweeps (seconds, 0 = disabled)
    pub health_check_interval_secs: u64,
    /// Back-off after a failed sweep iteration (seconds)
    pub health_retry_delay_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: 30_000,
            health_check_interval_secs: 60,
            health_retry_delay_secs: 10,
        }
    }
}

impl RegistryConfig {
    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms) * STALENESS_MULTIPLIER
    }
}

/// What `submit` does when the queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaturationPolicy {
    /// Fail fast with `SchedulerError::Saturated`
    #[default]
    Reject,
    /// Wait for queue space
    Block,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Bounded queue capacity
    pub queue_capacity: usize,
    pub saturation: SaturationPolicy,
    /// How long a terminal task stays queryable (ms)
    pub task_grace_period_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 100,
            saturation: SaturationPolicy::Reject,
            task_grace_period_ms: 300_000,
        }
    }
}

impl SchedulerConfig {
    pub fn task_grace_period(&self) -> Duration {
        Duration::from_millis(self.task_grace_period_ms)
    }

    /// Worker count, never zero
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Directory for daily rolling log files
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("scheduler.saturation", "reject")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SWITCHBOARD_ENV")
                        .unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SWITCHBOARD_SCHEDULER__WORKERS, etc.)
            .add_source(
                Environment::with_prefix("SWITCHBOARD")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
