//! Configuration management for Horae
//!
//! This module handles loading, validation, and management of the service
//! configuration from YAML files, with an environment override for the route
//! that carries the device credentials.

use crate::error::{HoraeError, Result};
use crate::range::{DateRangeInput, parse_time_of_day};
use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Environment variable that overrides `session.route`
pub const ROUTE_ENV: &str = "HORAE_ROUTE";

/// Placeholder substituted with the device id in the endpoint template
pub const DEVICE_PLACEHOLDER: &str = "{deviceId}";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Route the dashboard was opened with
    pub session: SessionConfig,

    /// Remote telemetry API
    pub telemetry: TelemetryConfig,

    /// Date range defaults and the time-of-day window table
    pub dashboard: DashboardConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,
}

/// Session route configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SessionConfig {
    /// `/{deviceId}/{token}` or `/{token}`
    pub route: String,
}

/// Telemetry API configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Timeseries endpoint; `{deviceId}` is replaced with the device id
    pub endpoint_template: String,

    /// Device used when the route only carries a token
    pub default_device_id: String,

    /// Metric key requested and summed
    pub metric_key: String,

    /// Server-side aggregation function
    pub aggregation: String,

    /// Aggregation bucket size in milliseconds
    pub interval_ms: u64,

    /// Pause between two consecutive calls of one cycle
    pub pacing_delay_ms: u64,

    /// Per-request timeout in seconds (0 disables)
    pub request_timeout_secs: u64,
}

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DashboardConfig {
    /// Days before today covered by the initial date range
    pub lookback_days: u32,

    /// Timezone used to determine "today"
    pub timezone: String,

    /// Time-of-day windows in display order
    pub windows: Vec<WindowConfig>,
}

/// One configured time-of-day window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WindowConfig {
    /// Stable identifier
    pub id: String,

    /// Display label
    #[serde(default)]
    pub label: String,

    /// Start time in HH:MM format
    pub from_time: String,

    /// End time in HH:MM format
    pub to_time: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console level override
    pub console_level: Option<String>,

    /// Optional file level override
    pub file_level: Option<String>,

    /// Path to log file (its directory holds the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl TelemetryConfig {
    /// Pacing delay as a `Duration`
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    /// Request timeout, if one is configured
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Configured fallback device, if any
    pub fn default_device(&self) -> Option<&str> {
        let id = self.default_device_id.trim();
        (!id.is_empty()).then_some(id)
    }
}

impl DashboardConfig {
    /// Calendar date of `now` in the configured timezone
    pub fn today(&self, now: DateTime<Utc>) -> Result<NaiveDate> {
        let tz: chrono_tz::Tz = self.timezone.parse().map_err(|_| {
            HoraeError::validation(
                "dashboard.timezone",
                format!("Unknown timezone: {}", self.timezone),
            )
        })?;
        Ok(now.with_timezone(&tz).date_naive())
    }

    /// Initial date range: `lookback_days` before today through today
    pub fn initial_date_range(&self, now: DateTime<Utc>) -> Result<DateRangeInput> {
        let today = self.today(now)?;
        Ok(DateRangeInput::trailing_days(today, self.lookback_days))
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists,
    /// then apply environment overrides
    pub fn load() -> Result<Self> {
        let default_paths = [
            "horae_config.yaml",
            "/data/horae_config.yaml",
            "/etc/horae/config.yaml",
        ];

        let mut config = match default_paths.iter().find(|p| Path::new(p).exists()) {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `HORAE_ROUTE` when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(route) = std::env::var(ROUTE_ENV) {
            if !route.trim().is_empty() {
                self.session.route = route;
            }
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Copy safe to serve: the route (which carries the token) is masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.session.route.is_empty() {
            copy.session.route = "***".to_string();
        }
        copy
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let telemetry = &self.telemetry;
        if telemetry.endpoint_template.trim().is_empty() {
            return Err(HoraeError::validation(
                "telemetry.endpoint_template",
                "Endpoint template cannot be empty",
            ));
        }
        if !telemetry.endpoint_template.contains(DEVICE_PLACEHOLDER) {
            return Err(HoraeError::validation(
                "telemetry.endpoint_template",
                format!("Endpoint template must contain {}", DEVICE_PLACEHOLDER),
            ));
        }
        if telemetry.metric_key.trim().is_empty() {
            return Err(HoraeError::validation(
                "telemetry.metric_key",
                "Metric key cannot be empty",
            ));
        }
        if telemetry.aggregation.trim().is_empty() {
            return Err(HoraeError::validation(
                "telemetry.aggregation",
                "Aggregation cannot be empty",
            ));
        }
        if telemetry.interval_ms == 0 {
            return Err(HoraeError::validation(
                "telemetry.interval_ms",
                "Must be greater than 0",
            ));
        }

        self.validate_windows()?;
        self.dashboard.today(Utc::now())?;

        crate::logging::parse_log_level(&self.logging.level)
            .map_err(|_| HoraeError::validation("logging.level", "Invalid log level"))?;

        if self.web.port == 0 {
            return Err(HoraeError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        Ok(())
    }

    fn validate_windows(&self) -> Result<()> {
        let windows = &self.dashboard.windows;
        if windows.is_empty() {
            return Err(HoraeError::validation(
                "dashboard.windows",
                "At least one window is required",
            ));
        }

        let mut seen = HashSet::new();
        for window in windows {
            if window.id.trim().is_empty() {
                return Err(HoraeError::validation(
                    "dashboard.windows",
                    "Window id cannot be empty",
                ));
            }
            if !seen.insert(window.id.as_str()) {
                return Err(HoraeError::validation(
                    "dashboard.windows",
                    format!("Duplicate window id: {}", window.id),
                ));
            }
            for time in [&window.from_time, &window.to_time] {
                if parse_time_of_day(time).is_none() {
                    return Err(HoraeError::validation(
                        "dashboard.windows",
                        format!("Window {} has invalid time '{}'", window.id, time),
                    ));
                }
            }
        }
        Ok(())
    }
}
