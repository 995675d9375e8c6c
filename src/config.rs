use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telegraf: TelegrafConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log output format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegrafConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FiltersConfig {
    /// Comma-separated glob patterns; empty means "include everything".
    #[serde(default)]
    pub include: String,
    /// Comma-separated glob patterns; matches are always rejected.
    #[serde(default)]
    pub exclude: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Seconds between full polls of the watched unit set.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_socket_path() -> String {
    "/run/telegraf/telegraf.sock".to_string()
}

fn default_measurement() -> String {
    "systemd_units".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for TelegrafConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            measurement: default_measurement(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

impl AppConfig {
    /// Load from an optional config file path. No path means defaults; a
    /// path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let s = std::fs::read_to_string(p)
                    .map_err(|e| anyhow::anyhow!("reading config {}: {}", p.display(), e))?;
                Self::load_from_str(&s)
            }
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            matches!(
                self.logging.level.to_lowercase().as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ),
            "logging.level must be one of trace/debug/info/warn/error, got {:?}",
            self.logging.level
        );
        anyhow::ensure!(
            matches!(self.logging.format.as_str(), "text" | "json"),
            "logging.format must be \"text\" or \"json\", got {:?}",
            self.logging.format
        );
        anyhow::ensure!(
            !self.telegraf.socket_path.is_empty(),
            "telegraf.socket_path must be non-empty"
        );
        anyhow::ensure!(
            !self.telegraf.measurement.is_empty(),
            "telegraf.measurement must be non-empty"
        );
        anyhow::ensure!(
            self.monitoring.poll_interval > 0,
            "monitoring.poll_interval must be > 0, got {}",
            self.monitoring.poll_interval
        );
        Ok(())
    }
}
