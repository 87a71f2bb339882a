//! Notification receipt and click handling (service worker context).
//!
//! This context has no usable outbound network. On receipt it records the
//! event through [`EventLogWriter`] and shows the notification; the page
//! context reports the event later.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::PushResult;
use crate::event_log::EventLogWriter;
use crate::platform::NotificationDisplay;

/// Body shown when a push arrives without one.
pub const EMPTY_PAYLOAD_BODY: &str = "(with empty payload)";
/// Vibration pattern for every notification.
pub const VIBRATE_PATTERN: [u32; 3] = [400, 100, 400];

/// Action button as sent by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionButton {
    /// Button label.
    pub label: String,
    /// URL opened by the button.
    pub value: String,
}

/// Push message payload.
///
/// Fields are read leniently: `null` or an unexpected type reads as absent,
/// and numbers are accepted where text is expected. One odd field never
/// costs the notification or its receipt record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationPayload {
    /// Title.
    #[serde(rename = "Title", default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    /// Icon URL, pre-resized by the backend.
    #[serde(rename = "Icon", default, deserialize_with = "lenient_text")]
    pub icon: Option<String>,
    /// Body text.
    #[serde(rename = "Body", default, deserialize_with = "lenient_text")]
    pub body: Option<String>,
    /// Backend-assigned notification id.
    #[serde(default, deserialize_with = "lenient_text")]
    pub notification_id: Option<String>,
    /// URL of the first action.
    #[serde(default, deserialize_with = "lenient_text")]
    pub url: Option<String>,
    /// Extended property; takes precedence over `url`.
    #[serde(default, deserialize_with = "lenient_text")]
    pub click_action: Option<String>,
    /// Action buttons. Malformed entries are skipped.
    #[serde(default, deserialize_with = "lenient_buttons")]
    pub action_buttons: Option<Vec<ActionButton>>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_buttons<'de, D>(deserializer: D) -> Result<Option<Vec<ActionButton>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Array(items)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
    ))
}

/// Action shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    /// Button title.
    pub title: String,
    /// Action identifier (the URL to open).
    pub action: String,
}

/// Options handed to the platform's `showNotification`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayOptions {
    /// Icon URL.
    pub icon: String,
    /// Body text.
    pub body: String,
    /// Tag; the notification id.
    pub tag: String,
    /// Vibration pattern.
    pub vibrate: Vec<u32>,
    /// Click target when no action is selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Action buttons.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
}

impl NotificationPayload {
    /// Parse push message data. Individual fields never fail the parse.
    pub fn parse(data: &[u8]) -> PushResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Build display options.
    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            icon: self.icon.clone().unwrap_or_default(),
            body: self
                .body
                .clone()
                .unwrap_or_else(|| EMPTY_PAYLOAD_BODY.to_string()),
            tag: self.notification_id.clone().unwrap_or_default(),
            vibrate: VIBRATE_PATTERN.to_vec(),
            data: self.click_action.clone().or_else(|| self.url.clone()),
            actions: self
                .action_buttons
                .iter()
                .flatten()
                .map(|button| NotificationAction {
                    title: button.label.clone(),
                    action: button.value.clone(),
                })
                .collect(),
        }
    }
}

/// A click on a displayed notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationClick {
    /// Action button the user chose, if any.
    pub action: Option<String>,
    /// The notification's data property.
    pub data: Option<String>,
    /// The notification's actions.
    pub actions: Vec<NotificationAction>,
}

impl NotificationClick {
    /// URL to open: selected action, else data, else the first action.
    pub fn target(&self) -> Option<&str> {
        non_empty(self.action.as_deref())
            .or_else(|| non_empty(self.data.as_deref()))
            .or_else(|| self.actions.first().map(|a| a.action.as_str()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Push and click handlers of the service worker.
pub struct ServiceWorker {
    writer: EventLogWriter,
    display: Arc<dyn NotificationDisplay>,
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl ServiceWorker {
    /// Handlers over an event log writer and the display surface.
    pub fn new(writer: EventLogWriter, display: Arc<dyn NotificationDisplay>) -> Self {
        Self { writer, display }
    }

    /// Handle a push message.
    ///
    /// Recording runs alongside display; a store failure is logged and
    /// never holds back or fails the notification.
    pub async fn handle_push(&self, data: Option<&[u8]>) -> PushResult<Option<DisplayOptions>> {
        let Some(data) = data else {
            log::debug!("[ServiceWorker] Push without data, nothing to show");
            return Ok(None);
        };
        let payload = NotificationPayload::parse(data)?;
        let options = payload.display_options();

        let record = async {
            match payload.notification_id.as_deref() {
                Some(id) if !id.is_empty() => {
                    if let Err(e) = self.writer.record_received(id).await {
                        log::warn!("[ServiceWorker] Recording notification {id} failed: {e}");
                    }
                }
                _ => log::debug!("[ServiceWorker] Payload has no notification_id"),
            }
        };
        let title = payload.title.as_deref().unwrap_or_default();
        let show = self.display.show_notification(title, &options);

        let ((), shown) = tokio::join!(record, show);
        shown?;
        Ok(Some(options))
    }

    /// Handle a notification click. Returns the opened URL, if any.
    pub async fn handle_click(&self, click: &NotificationClick) -> PushResult<Option<String>> {
        let Some(target) = click.target() else {
            return Ok(None);
        };
        self.display.open_window(target).await?;
        Ok(Some(target.to_string()))
    }
}
