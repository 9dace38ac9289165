use super::*;

/// Default window table: (from, to) in display order
const DEFAULT_WINDOWS: [(&str, &str); 7] = [
    ("00:00", "02:00"),
    ("02:45", "08:30"),
    ("08:30", "12:00"),
    ("12:00", "16:30"),
    ("16:30", "19:00"),
    ("19:00", "22:30"),
    ("22:30", "23:59"),
];

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint_template:
                "https://meterdashboard.kimbal.io/api/plugins/telemetry/DEVICE/{deviceId}/values/timeseries"
                    .to_string(),
            default_device_id: String::new(),
            metric_key: "netkvah".to_string(),
            aggregation: "SUM".to_string(),
            interval_ms: 7_200_000,
            pacing_delay_ms: 500,
            request_timeout_secs: 0,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let windows = DEFAULT_WINDOWS
            .iter()
            .enumerate()
            .map(|(i, (from, to))| WindowConfig {
                id: format!("section-{}", i + 1),
                label: "SELECT TIME".to_string(),
                from_time: (*from).to_string(),
                to_time: (*to).to_string(),
            })
            .collect();

        Self {
            lookback_days: 3,
            timezone: "UTC".to_string(),
            windows,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/horae.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            telemetry: TelemetryConfig::default(),
            dashboard: DashboardConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
        }
    }
}
