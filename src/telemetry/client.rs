use crate::config::{DEVICE_PLACEHOLDER, TelemetryConfig};
use crate::credentials::Credentials;
use crate::error::{HoraeError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::range::QueryDescriptor;
use crate::telemetry::{TelemetrySource, TimeseriesResponse};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};

const AUTH_HEADER: &str = "X-Authorization";

/// Timeseries client for the telemetry REST API
pub struct HttpTelemetryClient {
    http: reqwest::Client,
    endpoint_template: String,
    metric_key: String,
    aggregation: String,
    interval_ms: u64,
    logger: StructuredLogger,
}

impl HttpTelemetryClient {
    /// Create a client from the telemetry section of the configuration
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            endpoint_template: config.endpoint_template.clone(),
            metric_key: config.metric_key.clone(),
            aggregation: config.aggregation.clone(),
            interval_ms: config.interval_ms,
            logger: get_logger("telemetry"),
        })
    }

    /// Full request URL for one descriptor
    pub fn request_url(&self, query: &QueryDescriptor, device_id: &str) -> Result<reqwest::Url> {
        let base = self.endpoint_template.replace(DEVICE_PLACEHOLDER, device_id);
        let start = query.start_ts_ms().to_string();
        let end = query.end_ts_ms().to_string();
        let interval = self.interval_ms.to_string();

        reqwest::Url::parse_with_params(
            &base,
            [
                ("keys", self.metric_key.as_str()),
                ("startTs", start.as_str()),
                ("endTs", end.as_str()),
                ("agg", self.aggregation.as_str()),
                ("interval", interval.as_str()),
            ],
        )
        .map_err(|e| HoraeError::config(format!("Invalid telemetry endpoint '{}': {}", base, e)))
    }
}

#[async_trait::async_trait]
impl TelemetrySource for HttpTelemetryClient {
    async fn fetch(
        &self,
        query: &QueryDescriptor,
        credentials: &Credentials,
    ) -> Result<TimeseriesResponse> {
        let url = self.request_url(query, credentials.device_id())?;
        self.logger.debug(&format!(
            "GET timeseries date={} startTs={} endTs={}",
            query.date,
            query.start_ts_ms(),
            query.end_ts_ms()
        ));

        let resp = self
            .http
            .get(url)
            .header(AUTH_HEADER, credentials.bearer())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("horae/", env!("APP_VERSION")))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            self.logger
                .warn(&format!("Telemetry API error for {}: {}", query.date, status));
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    HoraeError::auth(format!("Telemetry API rejected credentials: {}", status))
                }
                _ => HoraeError::api(format!("Telemetry API returned {}", status)),
            });
        }

        let body = resp.bytes().await?;
        TimeseriesResponse::from_body(&body)
    }
}
