//! Sequential, paced execution of per-day queries
//!
//! Calls run strictly one after another with a fixed pause between
//! neighbours to stay under the remote rate limit. A failed call is recorded
//! and the sequence carries on.

use crate::credentials::Credentials;
use crate::error::HoraeError;
use crate::logging::StructuredLogger;
use crate::range::QueryDescriptor;
use crate::telemetry::{TelemetrySource, TimeseriesResponse};
use std::time::Duration;

/// Outcome of one remote call
#[derive(Debug)]
pub struct QueryResult {
    pub descriptor: QueryDescriptor,
    pub outcome: std::result::Result<TimeseriesResponse, HoraeError>,
}

impl QueryResult {
    pub fn success(descriptor: QueryDescriptor, response: TimeseriesResponse) -> Self {
        Self {
            descriptor,
            outcome: Ok(response),
        }
    }

    pub fn failure(descriptor: QueryDescriptor, error: HoraeError) -> Self {
        Self {
            descriptor,
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Run one call per descriptor, in order, pausing `pacing` between calls.
///
/// The returned results match `descriptors` in length and order.
pub async fn execute_sequential(
    source: &dyn TelemetrySource,
    descriptors: &[QueryDescriptor],
    credentials: &Credentials,
    pacing: Duration,
    logger: &StructuredLogger,
) -> Vec<QueryResult> {
    let total = descriptors.len();
    let mut results = Vec::with_capacity(total);

    for (i, descriptor) in descriptors.iter().enumerate() {
        logger.debug(&format!(
            "Call {}/{} for {} {}-{}",
            i + 1,
            total,
            descriptor.date,
            descriptor.from_time.format("%H:%M"),
            descriptor.to_time.format("%H:%M")
        ));

        match source.fetch(descriptor, credentials).await {
            Ok(response) => results.push(QueryResult::success(*descriptor, response)),
            Err(e) => {
                logger.warn(&format!(
                    "Call {}/{} failed for {}: {}",
                    i + 1,
                    total,
                    descriptor.date,
                    e
                ));
                results.push(QueryResult::failure(*descriptor, e));
            }
        }

        if i + 1 < total && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
    }

    results
}
