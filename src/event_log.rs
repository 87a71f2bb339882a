//! Notification event log pipeline.
//!
//! Split across two execution contexts that never call each other:
//!
//! ```text
//! service worker (no network)          page (network, live subscription)
//!   EventLogWriter::record_received      EventLogUploader::report_pending
//!            │                                     │
//!            └──────────► EventLogStore ◄──────────┘
//!                  richflyer_database/notification
//!                  key "richflyer_notification"
//! ```
//!
//! The store holds exactly one record. A new notification overwrites it
//! and resets `is_sent_event_log`. A failed upload leaves the record unsent,
//! so the next opportunistic call retries it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{EventLogEntry, PushBackend};
use crate::error::{PushError, PushResult};

/// Database directory name.
pub const DATABASE_NAME: &str = "richflyer_database";
/// Table (object store) name.
pub const TABLE_NAME: &str = "notification";
/// Key of the single record.
pub const RECORD_KEY: &str = "richflyer_notification";

/// Unique temp-file suffix per write within this process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// The one received notification and whether it has been reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEventRecord {
    /// Record key, always [`RECORD_KEY`].
    pub name: String,
    /// Backend-assigned notification id.
    pub notification_id: String,
    /// Event log already uploaded.
    pub is_sent_event_log: bool,
}

impl NotificationEventRecord {
    /// Fresh, unreported record for a received notification.
    pub fn received(notification_id: &str) -> Self {
        Self {
            name: RECORD_KEY.to_string(),
            notification_id: notification_id.to_string(),
            is_sent_event_log: false,
        }
    }
}

type Table = BTreeMap<String, NotificationEventRecord>;

/// Durable single-table store shared by both contexts.
#[derive(Debug, Clone)]
pub struct EventLogStore {
    table_path: PathBuf,
}

impl EventLogStore {
    /// Store rooted at `data_dir`. Nothing is created until the first write.
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        Self {
            table_path: data_dir
                .as_ref()
                .join(DATABASE_NAME)
                .join(format!("{TABLE_NAME}.json")),
        }
    }

    /// Path of the table file.
    pub fn path(&self) -> &Path {
        &self.table_path
    }

    async fn read_table(&self) -> PushResult<Table> {
        match tokio::fs::read_to_string(&self.table_path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the whole table file; readers see the old or the new table.
    async fn write_table(&self, table: &Table) -> PushResult<()> {
        if let Some(dir) = self.table_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .table_path
            .with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        tokio::fs::write(&tmp, serde_json::to_vec(table)?).await?;
        tokio::fs::rename(&tmp, &self.table_path).await?;
        Ok(())
    }

    /// The stored record, if any notification has been received.
    pub async fn get(&self) -> PushResult<Option<NotificationEventRecord>> {
        Ok(self.read_table().await?.remove(RECORD_KEY))
    }

    /// Upsert the record, overwriting whatever was there.
    pub async fn put(&self, record: NotificationEventRecord) -> PushResult<()> {
        let mut table = Table::new();
        table.insert(RECORD_KEY.to_string(), record);
        self.write_table(&table).await
    }

    /// Flip `is_sent_event_log` for `notification_id`.
    ///
    /// Returns `false` without writing if the record now belongs to a newer
    /// notification; that one still needs reporting.
    pub async fn mark_sent(&self, notification_id: &str) -> PushResult<bool> {
        let mut table = self.read_table().await?;
        match table.get_mut(RECORD_KEY) {
            Some(record) if record.notification_id == notification_id => {
                record.is_sent_event_log = true;
            }
            _ => return Ok(false),
        }
        self.write_table(&table).await?;
        Ok(true)
    }
}

/// Write side, used from the notification-receipt handler.
#[derive(Debug, Clone)]
pub struct EventLogWriter {
    store: EventLogStore,
}

impl EventLogWriter {
    /// Writer over a store.
    pub fn new(store: EventLogStore) -> Self {
        Self { store }
    }

    /// Record "received, not yet reported", replacing any previous record.
    pub async fn record_received(&self, notification_id: &str) -> PushResult<()> {
        self.store
            .put(NotificationEventRecord::received(notification_id))
            .await?;
        log::debug!("[EventLog] Recorded notification {notification_id}");
        Ok(())
    }
}

/// What an upload attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// No notification has ever been recorded.
    NothingPending,
    /// The recorded notification was already reported.
    AlreadyReported,
    /// The event was reported and the record marked sent.
    Reported {
        /// Reported notification id.
        notification_id: String,
    },
}

/// Upload side, used from the networked page context.
pub struct EventLogUploader {
    store: EventLogStore,
    backend: Arc<dyn PushBackend>,
}

impl std::fmt::Debug for EventLogUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogUploader")
            .field("store", &self.store)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl EventLogUploader {
    /// Uploader over a store, reporting through `backend`.
    pub fn new(store: EventLogStore, backend: Arc<dyn PushBackend>) -> Self {
        Self { store, backend }
    }

    /// Report the pending notification event, if there is one.
    ///
    /// Idempotent: once the record is marked sent, further calls are no-ops
    /// until a new notification arrives.
    pub async fn report_pending(&self) -> PushResult<ReportOutcome> {
        let Some(record) = self.store.get().await? else {
            return Ok(ReportOutcome::NothingPending);
        };
        if record.is_sent_event_log {
            return Ok(ReportOutcome::AlreadyReported);
        }

        let entry = EventLogEntry::launch(&record.notification_id);
        if !self.backend.report_event(&entry).await? {
            log::warn!(
                "[EventLog] Reporting notification {} failed, will retry on next call",
                record.notification_id
            );
            return Err(PushError::EventLogFailed);
        }

        if !self.store.mark_sent(&record.notification_id).await? {
            log::info!("[EventLog] A newer notification arrived during upload; leaving it pending");
        }
        log::info!("[EventLog] Reported notification {}", record.notification_id);
        Ok(ReportOutcome::Reported {
            notification_id: record.notification_id,
        })
    }
}
