//! Shared fakes and helpers for integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::MockServer;

use pushbridge::platform::{
    HostRuntime, NotificationDisplay, PermissionState, PushManager, VendorPermission,
    VendorPushNotification,
};
use pushbridge::service_worker::DisplayOptions;
use pushbridge::{AuthTokenStore, Config, DeviceIdentity, PushClient, Subscription};

/// Service key every test client sends.
pub const SERVICE_KEY: &str = "sk_test_123";
/// Site domain every test client registers.
pub const DOMAIN: &str = "shop.example.com";
/// Website push id for vendor tests.
pub const WEBSITE_PUSH_ID: &str = "web.com.example.shop";

/// Auth secret whose encoding has no padding or substituted characters.
pub const AUTH_A: [u8; 6] = [1, 2, 3, 4, 5, 6];
/// A second, distinct auth secret.
pub const AUTH_B: [u8; 6] = [6, 5, 4, 3, 2, 1];
/// Browser-sized 16 byte auth secret; its identity ends in `==`.
pub const AUTH_PADDED: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

pub fn subscription(auth: &[u8]) -> Subscription {
    Subscription::new(
        "https://push.example.com/send/abc",
        vec![4, 10, 20, 30],
        auth.to_vec(),
    )
}

/// `/v1/devices/{identity}/{resource}` for a subscription auth secret.
pub fn device_path(auth: &[u8], resource: &str) -> String {
    let identity = DeviceIdentity::derive(&subscription(auth));
    format!("/v1/devices/{identity}/{resource}")
}

pub fn config(server: &MockServer, dir: &TempDir) -> Config {
    Config {
        api_url: server.uri(),
        service_key: SERVICE_KEY.to_string(),
        domain: DOMAIN.to_string(),
        website_push_id: WEBSITE_PUSH_ID.to_string(),
        data_dir: Some(dir.path().to_path_buf()),
        ..Config::default()
    }
}

/// Push API fake with a fixed permission answer.
pub struct FakePushManager {
    permission: PermissionState,
    subscription: Mutex<Option<Subscription>>,
    pending: Subscription,
    pub registered_workers: Mutex<Vec<String>>,
    pub subscribed_with: Mutex<Option<Vec<u8>>>,
}

impl FakePushManager {
    /// Not yet subscribed; `subscribe` will hand out `pending`.
    pub fn new(permission: PermissionState, pending: Subscription) -> Arc<Self> {
        Arc::new(Self {
            permission,
            subscription: Mutex::new(None),
            pending,
            registered_workers: Mutex::new(Vec::new()),
            subscribed_with: Mutex::new(None),
        })
    }

    /// Already subscribed with `subscription`.
    pub fn subscribed(subscription: Subscription) -> Arc<Self> {
        let manager = Self::new(PermissionState::Granted, subscription.clone());
        *manager.subscription.lock().unwrap() = Some(subscription);
        manager
    }

    pub fn set_subscription(&self, subscription: Option<Subscription>) {
        *self.subscription.lock().unwrap() = subscription;
    }
}

#[async_trait]
impl PushManager for FakePushManager {
    async fn register_service_worker(&self, script_path: &str) -> Result<()> {
        self.registered_workers
            .lock()
            .unwrap()
            .push(script_path.to_string());
        Ok(())
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        Ok(self.permission)
    }

    async fn subscribe(&self, application_server_key: &[u8]) -> Result<Subscription> {
        *self.subscribed_with.lock().unwrap() = Some(application_server_key.to_vec());
        *self.subscription.lock().unwrap() = Some(self.pending.clone());
        Ok(self.pending.clone())
    }

    async fn get_subscription(&self) -> Result<Option<Subscription>> {
        Ok(self.subscription.lock().unwrap().clone())
    }

    async fn unsubscribe(&self, _subscription: &Subscription) -> Result<bool> {
        Ok(self.subscription.lock().unwrap().take().is_some())
    }
}

/// Vendor permission fake: answers `initial`, and `after_prompt` once prompted.
pub struct FakeVendor {
    initial: VendorPermission,
    after_prompt: VendorPermission,
    pub prompts: AtomicUsize,
    prompted: Mutex<bool>,
}

impl FakeVendor {
    pub fn new(initial: VendorPermission, after_prompt: VendorPermission) -> Arc<Self> {
        Arc::new(Self {
            initial,
            after_prompt,
            prompts: AtomicUsize::new(0),
            prompted: Mutex::new(false),
        })
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

pub fn vendor_permission(state: PermissionState, token: Option<&str>) -> VendorPermission {
    VendorPermission {
        permission: state,
        device_token: token.map(str::to_string),
    }
}

#[async_trait]
impl VendorPushNotification for FakeVendor {
    async fn permission(&self, _website_push_id: &str) -> Result<VendorPermission> {
        if *self.prompted.lock().unwrap() {
            Ok(self.after_prompt.clone())
        } else {
            Ok(self.initial.clone())
        }
    }

    async fn request_permission(
        &self,
        _web_service_url: &str,
        _website_push_id: &str,
    ) -> Result<VendorPermission> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        *self.prompted.lock().unwrap() = true;
        Ok(self.after_prompt.clone())
    }
}

/// Runtime exposing whichever fakes were supplied.
#[derive(Default)]
pub struct FakeRuntime {
    pub manager: Option<Arc<FakePushManager>>,
    pub vendor: Option<Arc<FakeVendor>>,
}

impl HostRuntime for FakeRuntime {
    fn push_manager(&self) -> Option<Arc<dyn PushManager>> {
        self.manager
            .as_ref()
            .map(|m| Arc::clone(m) as Arc<dyn PushManager>)
    }

    fn vendor_push(&self) -> Option<Arc<dyn VendorPushNotification>> {
        self.vendor
            .as_ref()
            .map(|v| Arc::clone(v) as Arc<dyn VendorPushNotification>)
    }
}

/// Client on the standard backend with an in-memory token slot.
pub fn standard_client(
    server: &MockServer,
    dir: &TempDir,
    manager: &Arc<FakePushManager>,
) -> PushClient {
    let runtime = FakeRuntime {
        manager: Some(Arc::clone(manager)),
        vendor: None,
    };
    PushClient::with_token_store(config(server, dir), &runtime, AuthTokenStore::memory()).unwrap()
}

/// Client on the vendor backend with an in-memory token slot.
pub fn vendor_client(server: &MockServer, dir: &TempDir, vendor: &Arc<FakeVendor>) -> PushClient {
    let runtime = FakeRuntime {
        manager: None,
        vendor: Some(Arc::clone(vendor)),
    };
    PushClient::with_token_store(config(server, dir), &runtime, AuthTokenStore::memory()).unwrap()
}

/// Display fake recording what was shown and opened.
#[derive(Default)]
pub struct RecordingDisplay {
    pub shown: Mutex<Vec<(String, DisplayOptions)>>,
    pub opened: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationDisplay for RecordingDisplay {
    async fn show_notification(&self, title: &str, options: &DisplayOptions) -> Result<()> {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), options.clone()));
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
