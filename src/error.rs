//! Error taxonomy for push operations.
//!
//! Nothing here is fatal to the host. The worst case of any failure path is
//! that a feature silently did not complete, reported back as `Ok(false)`
//! or as one of these variants depending on the call site.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type PushResult<T> = Result<T, PushError>;

/// Push integration errors.
#[derive(Error, Debug)]
pub enum PushError {
    /// The user denied notification permission. Terminal, never retried.
    #[error("Notification permission denied")]
    PermissionDenied,
    /// Network, DNS or timeout failure talking to the backend.
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    /// The backend answered with an unexpected status.
    #[error("Backend rejected request (HTTP {status}): {message}")]
    BackendRejected {
        /// HTTP status code.
        status: u16,
        /// The backend's `message` field, or the raw body.
        message: String,
    },
    /// The bearer token was rejected with 401.
    #[error("Auth token is stale")]
    StaleAuth,
    /// A response was missing an expected field or was not parseable.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// No push subscription is available for this origin.
    #[error("No push subscription available")]
    SubscriptionUnavailable,
    /// The vendor backend could not resolve a server-side device id.
    #[error("Vendor device id unavailable")]
    DeviceIdUnavailable,
    /// A segment update was reported as failed by the backend client.
    #[error("Update segments failed")]
    SegmentUpdateFailed,
    /// Uploading the pending notification event failed.
    #[error("Register event log failed")]
    EventLogFailed,
    /// Durable store I/O failure.
    #[error("Store I/O error: {0}")]
    Store(#[from] std::io::Error),
    /// Durable store contents could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// OS keyring failure.
    #[error("Keyring error: {0}")]
    Keyring(String),
    /// Failure reported by a host collaborator (push manager, display, ...).
    #[error(transparent)]
    Platform(#[from] anyhow::Error),
}

impl From<keyring::Error> for PushError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}
