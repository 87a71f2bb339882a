//! File-backed host runtime for headless use.
//!
//! A browser subscription exported with `PushSubscription.toJSON()` is
//! imported once and kept under the data directory. The push manager then
//! serves that subscription; it cannot create new ones.
//!
//! # Storage structure
//!
//! ```text
//! {data_dir}/
//!     subscription.json          # imported subscription (toJSON shape)
//!     auth_token.json            # token slot in file mode
//!     richflyer_database/
//!         notification.json      # event log record
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::platform::{
    HostRuntime, NotificationDisplay, PermissionState, PushManager, VendorPushNotification,
};
use crate::service_worker::DisplayOptions;
use crate::subscription::Subscription;

/// Imported subscription file name.
const SUBSCRIPTION_FILE: &str = "subscription.json";

/// Push manager over an imported subscription file.
#[derive(Debug)]
pub struct SubscriptionFile {
    path: PathBuf,
}

impl SubscriptionFile {
    /// Subscription file under `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SUBSCRIPTION_FILE),
        }
    }

    /// Validate and store a browser-exported subscription.
    pub fn import(&self, json: &str) -> Result<Subscription> {
        let subscription =
            Subscription::from_json(json).context("Invalid subscription JSON")?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create data directory")?;
        }
        fs::write(&self.path, subscription.to_json()?)
            .context("Failed to write subscription file")?;

        // The auth secret doubles as the device identity
        #[cfg(unix)]
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;

        log::info!("Imported subscription for {}", subscription.endpoint());
        Ok(subscription)
    }

    fn load(&self) -> Result<Option<Subscription>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).context("Failed to read subscription file")?;
        Ok(Some(
            Subscription::from_json(&content).context("Failed to parse subscription file")?,
        ))
    }
}

#[async_trait]
impl PushManager for SubscriptionFile {
    async fn register_service_worker(&self, script_path: &str) -> Result<()> {
        log::debug!("Service worker {script_path} is managed by the browser");
        Ok(())
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        if self.path.exists() {
            Ok(PermissionState::Granted)
        } else {
            log::warn!("No subscription imported; run `pushbridge import` first");
            Ok(PermissionState::Undetermined)
        }
    }

    async fn subscribe(&self, _application_server_key: &[u8]) -> Result<Subscription> {
        self.load()?
            .context("No subscription imported; run `pushbridge import` first")
    }

    async fn get_subscription(&self) -> Result<Option<Subscription>> {
        self.load()
    }

    async fn unsubscribe(&self, _subscription: &Subscription) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to remove subscription file"),
        }
    }
}

/// Host runtime exposing only the file-backed push manager.
#[derive(Debug, Clone)]
pub struct FileHost {
    manager: Arc<SubscriptionFile>,
}

impl FileHost {
    /// Host over `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            manager: Arc::new(SubscriptionFile::new(data_dir)),
        }
    }

    /// The subscription file.
    pub fn subscriptions(&self) -> &SubscriptionFile {
        &self.manager
    }
}

impl HostRuntime for FileHost {
    fn push_manager(&self) -> Option<Arc<dyn PushManager>> {
        Some(Arc::clone(&self.manager) as Arc<dyn PushManager>)
    }

    fn vendor_push(&self) -> Option<Arc<dyn VendorPushNotification>> {
        None
    }
}

/// Display surface that prints notifications to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDisplay;

#[async_trait]
impl NotificationDisplay for ConsoleDisplay {
    async fn show_notification(&self, title: &str, options: &DisplayOptions) -> Result<()> {
        println!("{title}");
        println!("{}", serde_json::to_string_pretty(options)?);
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        println!("open {url}");
        Ok(())
    }
}
