//! Standard Push API backend.
//!
//! The device is addressed by the encoded `auth` secret of the current
//! subscription. The subscription is never cached here; it is fetched from
//! the push manager whenever an identity is needed.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::{BackendKind, PushBackend, Session};
use crate::api;
use crate::error::{PushError, PushResult};
use crate::platform::PushManager;
use crate::subscription::{DeviceIdentity, Subscription, SubscriptionKey};

/// Body of `POST /v1/devices/webpush`.
#[derive(Debug, Serialize)]
struct ActivateRequest<'a> {
    endpoint: &'a str,
    p256dh: String,
    auth: String,
    domain: &'a str,
}

/// Backend for platforms exposing the standard Push API.
pub struct StandardBackend {
    session: Session,
    manager: Arc<dyn PushManager>,
    domain: String,
}

impl std::fmt::Debug for StandardBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardBackend")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl StandardBackend {
    /// Create a backend for `domain` over the platform push manager.
    pub fn new(session: Session, manager: Arc<dyn PushManager>, domain: impl Into<String>) -> Self {
        Self {
            session,
            manager,
            domain: domain.into(),
        }
    }

    /// Platform push manager.
    pub fn manager(&self) -> &Arc<dyn PushManager> {
        &self.manager
    }

    /// Register a subscription with the backend.
    ///
    /// Success is exactly HTTP 200. Any other status, and any transport
    /// failure, yields `false`.
    pub async fn activate_subscription(&self, subscription: &Subscription) -> bool {
        let request = ActivateRequest {
            endpoint: subscription.endpoint(),
            p256dh: subscription.encoded_key(SubscriptionKey::P256dh),
            auth: DeviceIdentity::derive(subscription).as_str().to_string(),
            domain: &self.domain,
        };

        let response = match self
            .session
            .api()
            .request(Method::POST, "/v1/devices/webpush")
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                log::warn!("[Activate] Device activation request failed: {e}");
                return false;
            }
        };

        if response.status() == StatusCode::OK {
            log::info!("[Activate] Device activated for {}", self.domain);
            return true;
        }
        // Usually a mistyped service key
        log::warn!("[Activate] {}", api::rejection(response).await);
        false
    }

    async fn current_subscription(&self) -> PushResult<Option<Subscription>> {
        Ok(self.manager.get_subscription().await?)
    }
}

#[async_trait]
impl PushBackend for StandardBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Standard
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn device_identity(&self) -> PushResult<Option<DeviceIdentity>> {
        let subscription = self.current_subscription().await?;
        if subscription.is_none() {
            log::warn!("[Standard] {}", PushError::SubscriptionUnavailable);
        }
        Ok(subscription.as_ref().map(DeviceIdentity::derive))
    }

    async fn activate(&self) -> bool {
        match self.current_subscription().await {
            Ok(Some(subscription)) => self.activate_subscription(&subscription).await,
            Ok(None) => {
                log::warn!("[Activate] No push subscription to activate");
                false
            }
            Err(e) => {
                log::warn!("[Activate] Reading push subscription failed: {e}");
                false
            }
        }
    }

    async fn recover_unregistered_device(&self) -> bool {
        self.activate().await
    }
}
