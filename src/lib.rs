//! Pushbridge - client-side push notification integration layer.
//!
//! Bridges a web application (and its service worker) to the RichFlyer
//! push-delivery backend. Two delivery mechanisms are supported behind one
//! device/session model: the standards-based Push API and the vendor
//! (Safari remote notification) mechanism.
//!
//! # Architecture
//!
//! ```text
//! PushClient (façade, page context)
//!     │
//!     ├── PushBackend (trait, chosen once by capability probe)
//!     │   ├── StandardBackend  (Push API subscription)
//!     │   └── VendorBackend    (vendor permission object + server device id)
//!     │          │
//!     │          └── AuthTokenStore ── ApiClient ── HTTP
//!     │
//!     └── EventLogUploader ──┐
//!                            │  EventLogStore (durable, single record)
//! ServiceWorker ──────────── ┘  (write side, no network)
//! ```
//!
//! The write side and the upload side of the event log never call each
//! other; they only share the durable record.
//!
//! # Modules
//!
//! - [`client`] - the façade used by host applications
//! - [`backend`] - the two backend implementations
//! - [`segments`] - segment value normalization
//! - [`event_log`] - durable notification event record
//! - [`service_worker`] - notification receipt and click handling
//! - [`platform`] - host collaborator traits

pub mod api;
pub mod backend;
pub mod client;
pub mod codec;
pub mod config;
pub mod env;
pub mod error;
pub mod event_log;
pub mod host;
pub mod platform;
pub mod segments;
pub mod service_worker;
pub mod subscription;
pub mod token_store;

// Re-export commonly used types
pub use client::{InitOutcome, PushClient, ReportOutcome};
pub use config::Config;
pub use error::{PushError, PushResult};
pub use segments::{SegmentSet, SegmentValue};
pub use subscription::{DeviceIdentity, Subscription};
pub use token_store::AuthTokenStore;
