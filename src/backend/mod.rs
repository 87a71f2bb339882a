//! Push backends: one capability set, two delivery mechanisms.
//!
//! # Architecture
//!
//! ```text
//! PushBackend (trait)
//!     │
//!     ├── StandardBackend
//!     │   └── identity = encoded `auth` key of the Push API subscription
//!     │
//!     └── VendorBackend
//!         └── identity = server device id looked up from the vendor token
//! ```
//!
//! Implementations supply identity resolution and activation. Token
//! minting, get-or-mint, and the authenticated calls (segments, event log)
//! are shared and live here as provided methods.
//!
//! # Stale tokens
//!
//! A 401 on an authenticated call means the cached token is past its
//! 60 minute window. The call mints a fresh token and retries exactly once;
//! a second 401 is a plain failure.

// Rust guideline compliant 2026-02

pub mod standard;
pub mod vendor;

use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::{self, ApiClient, DEVICE_NOT_REGISTERED};
use crate::error::{PushError, PushResult};
use crate::subscription::DeviceIdentity;
use crate::token_store::AuthTokenStore;

pub use standard::StandardBackend;
pub use vendor::VendorBackend;

/// Which delivery mechanism a backend drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Standards-based Push API.
    Standard,
    /// Vendor remote notifications.
    Vendor,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Vendor => write!(f, "vendor"),
        }
    }
}

/// State shared by both backends: API client and token slot.
#[derive(Debug, Clone)]
pub struct Session {
    api: ApiClient,
    tokens: AuthTokenStore,
    /// Collapses concurrent get-or-mint callers into one mint.
    mint_guard: Arc<tokio::sync::Mutex<()>>,
}

impl Session {
    /// Create a session over an API client and token store.
    pub fn new(api: ApiClient, tokens: AuthTokenStore) -> Self {
        Self {
            api,
            tokens,
            mint_guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// API client.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Token store.
    pub fn tokens(&self) -> &AuthTokenStore {
        &self.tokens
    }

    /// POST `/v1/devices/{identity}/authentication-tokens`.
    async fn request_token(&self, identity: &DeviceIdentity) -> PushResult<MintResponse> {
        let response = self
            .api
            .device_request(Method::POST, identity, "authentication-tokens")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            let body: TokenResponse = match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    log::warn!("[Auth] {}", PushError::MalformedResponse(e.to_string()));
                    return Ok(MintResponse::Rejected);
                }
            };
            return Ok(match body.id_token {
                Some(token) if !token.is_empty() => MintResponse::Minted(token),
                _ => {
                    log::warn!("[Auth] Token response has no id_token");
                    MintResponse::Rejected
                }
            });
        }

        let body = api::read_error_body(response).await;
        log::warn!(
            "[Auth] status:{} msg:{}",
            status.as_u16(),
            body.message.as_deref().unwrap_or_default()
        );
        if status == StatusCode::NOT_FOUND && body.code == Some(DEVICE_NOT_REGISTERED) {
            return Ok(MintResponse::DeviceNotRegistered);
        }
        Ok(MintResponse::Rejected)
    }

    async fn store_minted(&self, token: &str) -> PushResult<bool> {
        self.tokens.set_token(token).await?;
        log::info!("[Auth] Minted new auth token");
        Ok(true)
    }
}

/// Body of a successful token mint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

enum MintResponse {
    Minted(String),
    DeviceNotRegistered,
    Rejected,
}

/// Event kind reported when a notification led the user to the site.
pub const LAUNCH_APP_EVENT: &str = "richflyer_launch_app";

/// Body of `POST /v1/devices/{id}/event-logs-webpush`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventLogEntry {
    /// Backend-assigned notification id.
    pub notification_id: String,
    /// Event kind.
    pub event_id: String,
    /// Unix seconds.
    pub event_time: i64,
}

impl EventLogEntry {
    /// Launch event for a notification, timestamped now.
    pub fn launch(notification_id: &str) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            event_id: LAUNCH_APP_EVENT.to_string(),
            event_time: chrono::Utc::now().timestamp(),
        }
    }
}

/// An authenticated, device-scoped call.
#[derive(Debug, Clone, Copy)]
pub enum DeviceCall<'a> {
    /// PUT normalized segments.
    Segments(&'a BTreeMap<String, String>),
    /// POST an event log entry.
    EventLog(&'a EventLogEntry),
}

impl DeviceCall<'_> {
    fn request(&self, api: &ApiClient, identity: &DeviceIdentity, token: &str) -> RequestBuilder {
        let builder = match self {
            Self::Segments(segments) => api
                .device_request(Method::PUT, identity, "segments")
                .json(&serde_json::json!({ "segments": segments })),
            Self::EventLog(entry) => api
                .device_request(Method::POST, identity, "event-logs-webpush")
                .json(entry),
        };
        builder
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Segments(_) => "Segments",
            Self::EventLog(_) => "EventLog",
        }
    }
}

/// Uniform capability set over both delivery mechanisms.
#[async_trait]
pub trait PushBackend: Send + Sync {
    /// Delivery mechanism.
    fn kind(&self) -> BackendKind;

    /// Shared API client and token store.
    fn session(&self) -> &Session;

    /// Identity addressing this device, or `None` if it cannot be resolved.
    async fn device_identity(&self) -> PushResult<Option<DeviceIdentity>>;

    /// Register this device with the backend. Rejections and transport
    /// failures both yield `false`.
    async fn activate(&self) -> bool;

    /// Called when minting reports "device not registered". Returns `true`
    /// if the device was re-registered and minting may be retried.
    async fn recover_unregistered_device(&self) -> bool {
        false
    }

    /// Mint a fresh token and store it.
    ///
    /// Always starts by clearing the cached token. On "device not
    /// registered" the backend gets one chance to recover, after which
    /// minting is retried once. Transport failures propagate.
    async fn mint_auth_token(&self) -> PushResult<bool> {
        let session = self.session();
        if let Err(e) = session.tokens().clear_token().await {
            log::debug!("[Auth] Clearing cached token failed: {e}");
        }

        let Some(identity) = self.device_identity().await? else {
            log::warn!("[Auth] No device identity, cannot mint token");
            return Ok(false);
        };

        match session.request_token(&identity).await? {
            MintResponse::Minted(token) => session.store_minted(&token).await,
            MintResponse::Rejected => Ok(false),
            MintResponse::DeviceNotRegistered => {
                log::info!("[Auth] Device not registered on {} backend", self.kind());
                if !self.recover_unregistered_device().await {
                    return Ok(false);
                }
                match session.request_token(&identity).await? {
                    MintResponse::Minted(token) => session.store_minted(&token).await,
                    _ => Ok(false),
                }
            }
        }
    }

    /// Cached token, minting one if the cache is empty.
    ///
    /// `None` when minting failed; never an error for that case.
    async fn resolve_auth_key(&self) -> PushResult<Option<String>> {
        let tokens = self.session().tokens();
        if let Some(token) = tokens.get_cached_token().await? {
            return Ok(Some(token));
        }

        let _guard = self.session().mint_guard.lock().await;
        // Another caller may have minted while we waited
        if let Some(token) = tokens.get_cached_token().await? {
            return Ok(Some(token));
        }

        if !self.mint_auth_token().await? {
            log::warn!("[Auth] Can't make auth token");
            return Ok(None);
        }
        let token = tokens.get_cached_token().await?;
        if token.is_none() {
            log::warn!("[Auth] Minted token missing from store");
        }
        Ok(token)
    }

    /// PUT normalized segments for this device.
    async fn update_segments(&self, segments: &BTreeMap<String, String>) -> PushResult<bool> {
        send_authorized(self, DeviceCall::Segments(segments)).await
    }

    /// POST an event log entry for this device.
    async fn report_event(&self, entry: &EventLogEntry) -> PushResult<bool> {
        send_authorized(self, DeviceCall::EventLog(entry)).await
    }
}

/// Run an authenticated call with the single re-mint retry on 401.
async fn send_authorized<B>(backend: &B, call: DeviceCall<'_>) -> PushResult<bool>
where
    B: PushBackend + ?Sized,
{
    let label = call.label();
    let Some(token) = backend.resolve_auth_key().await? else {
        return Ok(false);
    };
    let Some(identity) = backend.device_identity().await? else {
        log::warn!("[{label}] No device identity");
        return Ok(false);
    };

    let api = backend.session().api();
    let response = call.request(api, &identity, &token).send().await?;
    match response.status() {
        StatusCode::OK => Ok(true),
        StatusCode::UNAUTHORIZED => {
            log::info!("[{label}] {} (401), minting a fresh one", PushError::StaleAuth);
            if !backend.mint_auth_token().await? {
                return Ok(false);
            }
            let Some(token) = backend.session().tokens().get_cached_token().await? else {
                return Ok(false);
            };

            let retry = call.request(api, &identity, &token).send().await?;
            if retry.status() == StatusCode::OK {
                return Ok(true);
            }
            log::warn!("[{label}] {}", api::rejection(retry).await);
            Ok(false)
        }
        _ => {
            log::warn!("[{label}] {}", api::rejection(response).await);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_deserialize() {
        let body: TokenResponse = serde_json::from_str(r#"{"id_token": "eyJ.abc"}"#).unwrap();
        assert_eq!(body.id_token.as_deref(), Some("eyJ.abc"));

        let body: TokenResponse = serde_json::from_str(r#"{"other": 1}"#).unwrap();
        assert_eq!(body.id_token, None);
    }

    #[test]
    fn test_event_log_entry_wire_shape() {
        let entry = EventLogEntry {
            notification_id: "n-1".to_string(),
            event_id: LAUNCH_APP_EVENT.to_string(),
            event_time: 1_700_000_000,
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            serde_json::json!({
                "notification_id": "n-1",
                "event_id": "richflyer_launch_app",
                "event_time": 1_700_000_000
            })
        );
    }

    #[test]
    fn test_launch_entry_uses_current_time() {
        let before = chrono::Utc::now().timestamp();
        let entry = EventLogEntry::launch("n-2");
        assert!(entry.event_time >= before);
        assert_eq!(entry.event_id, LAUNCH_APP_EVENT);
    }
}
