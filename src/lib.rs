//! # Horae - time-of-day energy window aggregator
//!
//! Horae splits the day into configurable time-of-day windows and, for a
//! user-chosen date range, totals the energy telemetry of one device inside
//! each window. Every window is fetched day by day against a remote
//! time-series API, one paced call at a time, and the samples are summed into
//! a per-window total.
//!
//! ## Architecture
//!
//! - `range`: input validation and per-day query expansion
//! - `telemetry`: the remote time-series API (trait seam + HTTP client)
//! - `executor`: sequential, paced call execution with failure isolation
//! - `aggregate`: reduction of call results into a window total
//! - `dashboard`: state-owning coordinator for per-window cycles
//! - `credentials`: device id and bearer token from the configured route
//! - `config`: configuration management and validation
//! - `logging`: structured logging and tracing
//! - `web`: HTTP API and live event stream

pub mod aggregate;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod executor;
pub mod logging;
pub mod range;
pub mod telemetry;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use credentials::Credentials;
pub use dashboard::{Dashboard, DashboardHandle, DashboardOptions};
pub use error::{HoraeError, Result};
