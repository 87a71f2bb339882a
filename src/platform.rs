//! Host collaborator interfaces.
//!
//! The push platform itself (service worker registration, the Push API,
//! the vendor permission object, notification display) belongs to the host
//! runtime. This crate consumes it through these traits.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::service_worker::DisplayOptions;
use crate::subscription::Subscription;

/// Notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    /// Neither granted nor denied yet ("default").
    Undetermined,
    /// User allowed notifications.
    Granted,
    /// User blocked notifications.
    Denied,
}

impl PermissionState {
    /// Parse the platform's permission string.
    pub fn from_platform(value: &str) -> Self {
        match value {
            "granted" => Self::Granted,
            "denied" => Self::Denied,
            _ => Self::Undetermined,
        }
    }
}

/// Standard Push API surface (`navigator.serviceWorker` + `PushManager`).
#[async_trait]
pub trait PushManager: Send + Sync {
    /// Register the service worker script.
    async fn register_service_worker(&self, script_path: &str) -> Result<()>;

    /// Ask the user for notification permission.
    async fn request_permission(&self) -> Result<PermissionState>;

    /// Subscribe with the server's application key (raw bytes).
    async fn subscribe(&self, application_server_key: &[u8]) -> Result<Subscription>;

    /// Current subscription, if any.
    async fn get_subscription(&self) -> Result<Option<Subscription>>;

    /// Drop the subscription. Returns `false` if the platform refused.
    async fn unsubscribe(&self, subscription: &Subscription) -> Result<bool>;
}

/// Permission record returned by the vendor permission object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorPermission {
    /// Permission state.
    pub permission: PermissionState,
    /// Vendor device token, present once granted.
    pub device_token: Option<String>,
}

/// Vendor (Safari remote notification) permission object.
#[async_trait]
pub trait VendorPushNotification: Send + Sync {
    /// Current permission for a website push id.
    async fn permission(&self, website_push_id: &str) -> Result<VendorPermission>;

    /// Prompt the user. Resolves once, when the user has responded.
    async fn request_permission(
        &self,
        web_service_url: &str,
        website_push_id: &str,
    ) -> Result<VendorPermission>;
}

/// Notification display surface of the service worker context.
#[async_trait]
pub trait NotificationDisplay: Send + Sync {
    /// Show a notification.
    async fn show_notification(&self, title: &str, options: &DisplayOptions) -> Result<()>;

    /// Open a window on the given URL (notification click).
    async fn open_window(&self, url: &str) -> Result<()>;
}

/// Capability probe over the host runtime.
pub trait HostRuntime: Send + Sync {
    /// The standard push manager, if the platform exposes one.
    fn push_manager(&self) -> Option<Arc<dyn PushManager>>;

    /// The vendor permission object, if the platform exposes one.
    fn vendor_push(&self) -> Option<Arc<dyn VendorPushNotification>>;
}

/// Result of the one-time capability probe.
#[derive(Clone)]
pub enum PlatformCapability {
    /// Standard Push API available.
    Standard(Arc<dyn PushManager>),
    /// Only vendor push available.
    Vendor(Arc<dyn VendorPushNotification>),
    /// No push support.
    Unsupported,
}

impl std::fmt::Debug for PlatformCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard(_) => write!(f, "Standard"),
            Self::Vendor(_) => write!(f, "Vendor"),
            Self::Unsupported => write!(f, "Unsupported"),
        }
    }
}

impl PlatformCapability {
    /// Probe the runtime. The standard Push API wins when both exist.
    pub fn probe(runtime: &dyn HostRuntime) -> Self {
        if let Some(manager) = runtime.push_manager() {
            Self::Standard(manager)
        } else if let Some(vendor) = runtime.vendor_push() {
            Self::Vendor(vendor)
        } else {
            Self::Unsupported
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_from_platform() {
        assert_eq!(PermissionState::from_platform("granted"), PermissionState::Granted);
        assert_eq!(PermissionState::from_platform("denied"), PermissionState::Denied);
        assert_eq!(PermissionState::from_platform("default"), PermissionState::Undetermined);
    }

    struct NoPush;

    impl HostRuntime for NoPush {
        fn push_manager(&self) -> Option<Arc<dyn PushManager>> {
            None
        }

        fn vendor_push(&self) -> Option<Arc<dyn VendorPushNotification>> {
            None
        }
    }

    #[test]
    fn test_probe_unsupported() {
        assert!(matches!(
            PlatformCapability::probe(&NoPush),
            PlatformCapability::Unsupported
        ));
    }
}
