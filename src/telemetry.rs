//! Remote timeseries reads
//!
//! [`TelemetrySource`] is the seam between cycle orchestration and the
//! network: the HTTP implementation lives in [`client`], tests substitute
//! their own.

use crate::credentials::Credentials;
use crate::error::Result;
use crate::range::QueryDescriptor;

pub mod client;
pub mod types;

pub use client::HttpTelemetryClient;
pub use types::{Sample, TimeseriesResponse};

/// Reads one day's window of the configured metric
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch(
        &self,
        query: &QueryDescriptor,
        credentials: &Credentials,
    ) -> Result<TimeseriesResponse>;
}
