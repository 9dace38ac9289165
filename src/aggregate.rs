//! Reduction of a cycle's query results into a window total

use crate::executor::QueryResult;
use crate::telemetry::Sample;
use serde::{Deserialize, Serialize};

/// Sign flag shown next to a window total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sign {
    Positive,
    Negative,
}

/// Sum of the usable samples in a slice, and how many were usable
pub fn sum_samples(samples: &[Sample]) -> (f64, usize) {
    samples
        .iter()
        .filter_map(Sample::numeric_value)
        .fold((0.0, 0), |(sum, n), v| (sum + v, n + 1))
}

/// Result of reducing one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowAggregate {
    /// Sum of all usable samples (0 when there were none)
    pub total: f64,
    pub sign: Sign,
    /// Samples that parsed as numbers
    pub samples_used: usize,
    /// Samples present but not numeric
    pub samples_skipped: usize,
    pub successful_calls: usize,
    pub failed_calls: usize,
    pub total_calls: usize,
}

impl WindowAggregate {
    /// Total rounded to two decimals, as displayed.
    ///
    /// Ties round away from zero (`0.125` shows as `0.13`).
    pub fn display_total(&self) -> String {
        format!("{:.2}", (self.total * 100.0).round() / 100.0)
    }

    pub fn has_data(&self) -> bool {
        self.samples_used > 0
    }

    /// `(failed, total)` when at least one call failed
    pub fn partial_failure(&self) -> Option<(usize, usize)> {
        (self.failed_calls > 0).then_some((self.failed_calls, self.total_calls))
    }
}

/// Fold every successful result's `metric_key` samples into one total.
///
/// Without a single usable sample the total is zero and the sign is
/// negative.
pub fn reduce(metric_key: &str, results: &[QueryResult]) -> WindowAggregate {
    let mut total = 0.0;
    let mut samples_used = 0;
    let mut samples_skipped = 0;
    let mut successful_calls = 0;
    let mut failed_calls = 0;

    for result in results {
        let Ok(response) = &result.outcome else {
            failed_calls += 1;
            continue;
        };
        successful_calls += 1;

        if let Some(samples) = response.samples(metric_key) {
            let (sum, used) = sum_samples(samples);
            total += sum;
            samples_used += used;
            samples_skipped += samples.len() - used;
        }
    }

    let (total, sign) = if samples_used > 0 {
        let sign = if total >= 0.0 {
            Sign::Positive
        } else {
            Sign::Negative
        };
        (total, sign)
    } else {
        (0.0, Sign::Negative)
    };

    WindowAggregate {
        total,
        sign,
        samples_used,
        samples_skipped,
        successful_calls,
        failed_calls,
        total_calls: results.len(),
    }
}
