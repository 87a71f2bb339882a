//! Push subscriptions and the device identity derived from them.
//!
//! A [`Subscription`] is owned by the platform push API. It is never
//! persisted by the page side; identifiers are re-derived from it on demand.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};

use crate::codec::{decode_url_safe_base64, encode_url_safe_base64};
use crate::error::PushResult;

/// Key material names exposed by a subscription (`getKey(name)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKey {
    /// Client P-256 ECDH public key.
    P256dh,
    /// Shared auth secret.
    Auth,
}

/// Platform push subscription handle.
#[derive(Clone, PartialEq, Eq)]
pub struct Subscription {
    endpoint: String,
    p256dh: Vec<u8>,
    auth: Vec<u8>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Build a subscription from raw key material.
    pub fn new(endpoint: impl Into<String>, p256dh: Vec<u8>, auth: Vec<u8>) -> Self {
        Self {
            endpoint: endpoint.into(),
            p256dh,
            auth,
        }
    }

    /// Push service endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Raw key material.
    pub fn key(&self, key: SubscriptionKey) -> &[u8] {
        match key {
            SubscriptionKey::P256dh => &self.p256dh,
            SubscriptionKey::Auth => &self.auth,
        }
    }

    /// Wire form of a key.
    pub fn encoded_key(&self, key: SubscriptionKey) -> String {
        encode_url_safe_base64(self.key(key))
    }

    /// Parse the JSON shape browsers produce from `PushSubscription.toJSON()`.
    pub fn from_json(json: &str) -> PushResult<Self> {
        let exported: ExportedSubscription = serde_json::from_str(json)?;
        exported.try_into()
    }

    /// Serialize back into the `toJSON()` shape.
    pub fn to_json(&self) -> PushResult<String> {
        let exported = ExportedSubscription {
            endpoint: self.endpoint.clone(),
            keys: ExportedKeys {
                p256dh: self.encoded_key(SubscriptionKey::P256dh),
                auth: self.encoded_key(SubscriptionKey::Auth),
            },
        };
        Ok(serde_json::to_string_pretty(&exported)?)
    }
}

#[derive(Serialize, Deserialize)]
struct ExportedSubscription {
    endpoint: String,
    keys: ExportedKeys,
}

#[derive(Serialize, Deserialize)]
struct ExportedKeys {
    p256dh: String,
    auth: String,
}

impl TryFrom<ExportedSubscription> for Subscription {
    type Error = crate::error::PushError;

    fn try_from(exported: ExportedSubscription) -> PushResult<Self> {
        Ok(Self {
            endpoint: exported.endpoint,
            p256dh: decode_url_safe_base64(&exported.keys.p256dh)?,
            auth: decode_url_safe_base64(&exported.keys.auth)?,
        })
    }
}

/// Path component addressing a device on the backend.
///
/// For the standard backend this is the encoded `auth` secret; for the vendor
/// backend it is the server-assigned device id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Wrap a server-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the identity from a subscription's `auth` key material.
    ///
    /// Deterministic: the same subscription always yields the same identity.
    pub fn derive(subscription: &Subscription) -> Self {
        Self(subscription.encoded_key(SubscriptionKey::Auth))
    }

    /// Identity as used in request paths.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
