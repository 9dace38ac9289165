use crate::aggregate::{Sign, WindowAggregate, sum_samples};
use crate::executor::QueryResult;
use crate::range::DateRangeInput;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where a window is in its validate → fetch → aggregate cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Idle,
    Validating,
    Fetching,
    Aggregating,
}

/// One remote call as it appears in a cycle's call log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub date: NaiveDate,
    pub start_ts: i64,
    pub end_ts: i64,
    pub ok: bool,
    /// Usable samples of the metric in this call's response
    pub samples: usize,
    pub error: Option<String>,
}

impl CallRecord {
    pub fn from_result(result: &QueryResult, metric_key: &str) -> Self {
        let d = &result.descriptor;
        let (ok, samples, error) = match &result.outcome {
            Ok(response) => {
                let used = response
                    .samples(metric_key)
                    .map_or(0, |s| sum_samples(s).1);
                (true, used, None)
            }
            Err(e) => (false, 0, Some(e.to_string())),
        };
        Self {
            date: d.date,
            start_ts: d.start_ts_ms(),
            end_ts: d.end_ts_ms(),
            ok,
            samples,
            error,
        }
    }
}

/// What happened in a finished cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub window_id: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub from_time: String,
    pub to_time: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub calls: Vec<CallRecord>,
    /// Absent when the cycle died before aggregating
    pub aggregate: Option<WindowAggregate>,
    pub error: Option<String>,
}

/// Public state of one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowState {
    pub id: String,
    pub label: String,
    pub from_time: String,
    pub to_time: String,
    /// Total formatted with two decimals
    pub total: String,
    pub sign: Sign,
    pub busy: bool,
    pub phase: CyclePhase,
    pub last_cycle: Option<CycleSummary>,
}

/// Immutable view published after every state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub date_range: DateRangeInput,
    pub windows: Vec<WindowState>,
    pub any_busy: bool,
}

impl DashboardSnapshot {
    pub fn window(&self, id: &str) -> Option<&WindowState> {
        self.windows.iter().find(|w| w.id == id)
    }
}

/// User-visible message raised by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Input rejected; the cycle never started
    ValidationFailed { window_id: String, message: String },
    /// A cycle for this window is still running
    RunRejected { window_id: String, message: String },
    /// Some calls failed; the total covers the rest
    PartialFailure {
        window_id: String,
        failed: usize,
        total: usize,
        message: String,
    },
    /// The cycle died unexpectedly; the previous total is kept
    CycleFailed { window_id: String, message: String },
}

impl Notice {
    pub fn partial_failure(window_id: &str, failed: usize, total: usize) -> Self {
        Self::PartialFailure {
            window_id: window_id.to_string(),
            failed,
            total,
            message: format!(
                "Warning: {} out of {} API calls failed. Results may be incomplete.",
                failed, total
            ),
        }
    }

    pub fn window_id(&self) -> &str {
        match self {
            Self::ValidationFailed { window_id, .. }
            | Self::RunRejected { window_id, .. }
            | Self::PartialFailure { window_id, .. }
            | Self::CycleFailed { window_id, .. } => window_id,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::ValidationFailed { message, .. }
            | Self::RunRejected { message, .. }
            | Self::PartialFailure { message, .. }
            | Self::CycleFailed { message, .. } => message,
        }
    }
}
