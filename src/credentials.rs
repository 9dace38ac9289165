//! Device credentials taken from the dashboard route
//!
//! The dashboard is opened as `/{deviceId}/{token}`, or `/{token}` when a
//! single device is configured globally. Credentials are parsed once at
//! startup and never change afterwards.

use crate::error::{HoraeError, Result};
use std::fmt;

/// Device identifier and bearer token for the telemetry API
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    device_id: String,
    token: String,
}

impl Credentials {
    /// Build credentials; both parts must be non-empty
    pub fn new(device_id: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let device_id = device_id.into().trim().to_string();
        let token = token.into().trim().to_string();
        if device_id.is_empty() {
            return Err(HoraeError::auth("Device id is required"));
        }
        if token.is_empty() {
            return Err(HoraeError::auth("Access token is required"));
        }
        Ok(Self { device_id, token })
    }

    /// Parse a route path of the form `/{deviceId}/{token}` or `/{token}`.
    ///
    /// Segments are percent-decoded, so `abc%2Bdef` yields the token `abc+def`.
    pub fn from_route(route: &str, default_device_id: Option<&str>) -> Result<Self> {
        let segments = route
            .trim()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect::<Result<Vec<String>>>()?;

        match segments.as_slice() {
            [device_id, token] => Self::new(device_id.as_str(), token.as_str()),
            [token] => match default_device_id {
                Some(device_id) => Self::new(device_id, token.as_str()),
                None => Err(HoraeError::auth(
                    "Route carries no device id and no default device is configured",
                )),
            },
            _ => Err(HoraeError::auth(
                "Route must look like /{deviceId}/{token} or /{token}",
            )),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Value for the `X-Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

fn decode_segment(segment: &str) -> Result<String> {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .map_err(|_| HoraeError::auth("Route segment is not valid UTF-8 once decoded"))
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("device_id", &self.device_id)
            .field("token", &"***")
            .finish()
    }
}
