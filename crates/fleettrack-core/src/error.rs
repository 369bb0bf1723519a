//! Error types for the FleetTrack tracking service.
//!
//! Each subsystem has its own error enum; `TrackerError` is the top-level
//! union used at crate boundaries. All variants are serializable so they can
//! travel through API responses and structured logs.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias using [`TrackerError`].
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Top-level error type for all tracking operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum TrackerError {
    /// Connection admission errors
    #[error("admission error: {0}")]
    Registry(#[from] RegistryError),

    /// Malformed position samples
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Durable store / order service errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal errors that shouldn't normally occur
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised by the connection registry.
///
/// `CapacityExceeded` is the admission refusal: the connection is closed and
/// the server does not retry on the client's behalf.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum RegistryError {
    /// The global connection ceiling has been reached
    #[error("connection ceiling reached: {current}/{max}")]
    CapacityExceeded { current: usize, max: usize },

    /// A record already exists for this connection id
    #[error("connection {0} already registered")]
    AlreadyRegistered(Uuid),
}

/// A position sample that violates a domain invariant.
///
/// Validation failures are the one class of error the producing client sees:
/// the sample is rejected with an error ack and is enqueued nowhere.
#[derive(Debug, Error, Serialize, Deserialize, PartialEq)]
pub enum ValidationError {
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("driver id must not be empty")]
    EmptyDriverId,
}

/// Errors from the durable location store or the order service.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum StoreError {
    /// Transport-level failure (connect, DNS, broken body)
    #[error("transport error: {0}")]
    Transport(String),

    /// The collaborator answered with an unexpected status
    #[error("unexpected status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    /// The response body could not be decoded
    #[error("response decode error: {0}")]
    Decode(String),

    /// The bounded I/O deadline elapsed
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn status(status: u16, endpoint: impl Into<String>) -> Self {
        Self::Status {
            status,
            endpoint: endpoint.into(),
        }
    }

    /// Transient errors are worth retrying on the next flush cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Transport(_) | StoreError::Timeout(_)
        ) || matches!(self, StoreError::Status { status, .. } if *status >= 500)
    }
}

/// Errors related to configuration loading and validation.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Missing required configuration field
    #[error("missing required configuration field: {field}")]
    MissingField { field: String },
}

impl ConfigError {
    pub fn load_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exceeded_display() {
        let err = RegistryError::CapacityExceeded {
            current: 100,
            max: 100,
        };
        assert_eq!(err.to_string(), "connection ceiling reached: 100/100");
    }

    #[test]
    fn test_store_error_transient() {
        assert!(StoreError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(StoreError::Transport("connection refused".into()).is_transient());
        assert!(StoreError::status(503, "/internal/locations").is_transient());
        assert!(!StoreError::status(422, "/internal/locations").is_transient());
        assert!(!StoreError::Decode("bad json".into()).is_transient());
    }

    #[test]
    fn test_error_serialization() {
        let err = TrackerError::Registry(RegistryError::CapacityExceeded {
            current: 10,
            max: 10,
        });
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Registry"));
        assert!(json.contains("CapacityExceeded"));
    }

    #[test]
    fn test_config_error_helpers() {
        let err = ConfigError::invalid_value("api.port", "cannot be 0");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = ConfigError::missing_field("storage.base_url");
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }
}
