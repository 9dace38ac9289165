use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One bucket returned by the timeseries endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Bucket timestamp in epoch milliseconds
    #[serde(default)]
    pub ts: i64,

    /// Usually a numeric string; anything else is tolerated here and
    /// filtered out by [`Sample::numeric_value`]
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl Sample {
    pub fn new(ts: i64, value: &str) -> Self {
        Self {
            ts,
            value: Some(serde_json::Value::String(value.to_string())),
        }
    }

    /// The value as a finite number, if it is one
    pub fn numeric_value(&self) -> Option<f64> {
        let parsed = match self.value.as_ref()? {
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            serde_json::Value::Number(n) => n.as_f64(),
            _ => None,
        };
        parsed.filter(|v| v.is_finite())
    }
}

/// Metric key to ordered samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeseriesResponse(pub BTreeMap<String, Vec<Sample>>);

impl TimeseriesResponse {
    /// Parse a response body; an empty or `null` body is an empty response
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let parsed: Option<Self> = serde_json::from_slice(body)?;
        Ok(parsed.unwrap_or_default())
    }

    pub fn with_metric(mut self, key: &str, samples: Vec<Sample>) -> Self {
        self.0.insert(key.to_string(), samples);
        self
    }

    /// Samples of one metric; `None` when the key is absent
    pub fn samples(&self, key: &str) -> Option<&[Sample]> {
        self.0.get(key).map(Vec::as_slice)
    }
}
