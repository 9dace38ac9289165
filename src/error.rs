//! Error types and handling for Horae
//!
//! This module defines the error taxonomy used throughout the service. Errors
//! raised by a single telemetry call are recorded against that call and never
//! abort a cycle; only validation errors stop a cycle before it starts.

use thiserror::Error;

/// Result type alias for Horae operations
pub type Result<T> = std::result::Result<T, HoraeError>;

/// Main error type for Horae
#[derive(Debug, Error)]
pub enum HoraeError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// User input rejected before a cycle starts
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Transport-level failures talking to the telemetry API
    #[error("Network error: {message}")]
    Network { message: String },

    /// Non-success responses from the telemetry API
    #[error("API error: {message}")]
    Api { message: String },

    /// Rejected credentials or malformed route
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// A cycle is already in flight for this window
    #[error("Window busy: {window} is already fetching")]
    Busy { window: String },

    /// Unknown window or other addressed entity
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Anything that escaped a cycle (panicked task, dropped channel)
    #[error("Unexpected error: {message}")]
    Unexpected { message: String },

    /// HTTP server errors (bind failures, serve loop exits)
    #[error("Web server error: {message}")]
    Web { message: String },
}

impl HoraeError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new busy error for a window
    pub fn busy<S: Into<String>>(window: S) -> Self {
        Self::Busy {
            window: window.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a new unexpected error
    pub fn unexpected<S: Into<String>>(message: S) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        Self::Web {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for HoraeError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HoraeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<serde_json::Error> for HoraeError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<reqwest::Error> for HoraeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::serialization(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}
