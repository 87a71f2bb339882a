//! Vendor (Safari remote notification) backend.
//!
//! The vendor transport exposes no client-held secret usable as identity.
//! The device is addressed by a server-assigned id, looked up from the
//! vendor device token on every identity-bearing call.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;

use super::{BackendKind, PushBackend, Session};
use crate::error::{PushError, PushResult};
use crate::platform::{VendorPermission, VendorPushNotification};
use crate::subscription::DeviceIdentity;

/// Backend for platforms exposing only vendor push.
pub struct VendorBackend {
    session: Session,
    vendor: Arc<dyn VendorPushNotification>,
    website_push_id: String,
}

impl std::fmt::Debug for VendorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorBackend")
            .field("website_push_id", &self.website_push_id)
            .finish_non_exhaustive()
    }
}

impl VendorBackend {
    /// Create a backend for a website push id.
    pub fn new(
        session: Session,
        vendor: Arc<dyn VendorPushNotification>,
        website_push_id: impl Into<String>,
    ) -> Self {
        Self {
            session,
            vendor,
            website_push_id: website_push_id.into(),
        }
    }

    /// Vendor permission object.
    pub fn vendor(&self) -> &Arc<dyn VendorPushNotification> {
        &self.vendor
    }

    /// Website push id this backend is bound to.
    pub fn website_push_id(&self) -> &str {
        &self.website_push_id
    }

    /// Resolve the server-side device id for a vendor permission.
    ///
    /// `Ok(None)` when there is no device token or the server has no id for
    /// it; the calling flow cannot proceed. Transport failures are `Err`.
    pub async fn get_vendor_device_id(
        &self,
        permission: &VendorPermission,
    ) -> PushResult<Option<DeviceIdentity>> {
        let Some(device_token) = permission.device_token.as_deref() else {
            log::warn!("[Vendor] Permission carries no device token");
            return Ok(None);
        };

        let response = self
            .session
            .api()
            .request(Method::GET, &format!("/v1/safari/devices/{device_token}/deviceID/"))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            // Token known to the browser but not to the server; the push
            // package may no longer be reachable
            log::warn!("[Vendor] Device id lookup returned {}", response.status());
            return Ok(None);
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("[Vendor] {}", PushError::MalformedResponse(e.to_string()));
                return Ok(None);
            }
        };
        let device_id = match body.get("device_id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        if device_id.is_none() {
            log::warn!("[Vendor] {}: response has no device_id", PushError::DeviceIdUnavailable);
        }
        Ok(device_id.map(DeviceIdentity::new))
    }
}

#[async_trait]
impl PushBackend for VendorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vendor
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn device_identity(&self) -> PushResult<Option<DeviceIdentity>> {
        let permission = self.vendor.permission(&self.website_push_id).await?;
        self.get_vendor_device_id(&permission).await
    }

    /// Vendor devices are registered by the push package exchange; here
    /// activation means the server knows a device id for this browser.
    async fn activate(&self) -> bool {
        match self.device_identity().await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                log::warn!("[Vendor] Device id lookup failed: {e}");
                false
            }
        }
    }
}
