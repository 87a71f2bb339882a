//! Push orchestrator: the façade host applications use.
//!
//! The backend is chosen once, at construction, by probing the host runtime
//! for the standard Push API and then for vendor push. It is never
//! re-evaluated mid-flow.
//!
//! # Initialization
//!
//! ```text
//! Standard: Start → RegisteringWorker → RequestingPermission
//!               ├── Denied
//!               └── Subscribing → Activating ─┬── Granted
//!                                             └── ActivationFailed
//!
//! Vendor:   Start → RequestingPermission (prompts once if undetermined)
//!               ├── Denied / Dismissed
//!               └── Activating (device id lookup) ─┬── Granted
//!                                                  └── ActivationFailed
//! ```

use std::sync::{Arc, Mutex};

use crate::api::ApiClient;
use crate::backend::{PushBackend, Session, StandardBackend, VendorBackend};
use crate::codec::decode_url_safe_base64;
use crate::config::Config;
use crate::error::{PushError, PushResult};
use crate::event_log::{EventLogStore, EventLogUploader};
use crate::platform::{HostRuntime, PermissionState, PlatformCapability};
use crate::segments::{normalize_segments, SegmentSet};
use crate::token_store::AuthTokenStore;

pub use crate::backend::BackendKind;
pub use crate::event_log::ReportOutcome;

/// Terminal result of one `initialize` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Permission granted and the device is registered.
    Granted,
    /// The user denied permission.
    Denied,
    /// The user closed the prompt without deciding.
    Dismissed,
    /// Permission granted but the backend did not register the device.
    ActivationFailed,
    /// The platform supports neither push mechanism.
    Unsupported,
}

/// Progress of the current `initialize` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Not started.
    Start,
    /// Registering the service worker.
    RegisteringWorker,
    /// Waiting for the user's permission decision.
    RequestingPermission,
    /// Creating the push subscription.
    Subscribing,
    /// Registering the device with the backend.
    Activating,
    /// Finished.
    Done(InitOutcome),
    /// Stopped on an error; a later `initialize` starts over.
    Failed,
}

#[derive(Clone)]
enum BackendHandle {
    Standard(Arc<StandardBackend>),
    Vendor(Arc<VendorBackend>),
    Unsupported,
}

impl BackendHandle {
    fn as_dyn(&self) -> Option<Arc<dyn PushBackend>> {
        match self {
            Self::Standard(b) => Some(Arc::clone(b) as Arc<dyn PushBackend>),
            Self::Vendor(b) => Some(Arc::clone(b) as Arc<dyn PushBackend>),
            Self::Unsupported => None,
        }
    }
}

/// Façade over the selected backend, token store and event log.
pub struct PushClient {
    config: Config,
    session: Session,
    backend: BackendHandle,
    event_store: EventLogStore,
    state: Mutex<InitState>,
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("backend", &self.backend_kind())
            .field("domain", &self.config.domain)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PushClient {
    /// Build a client, with the token store the configuration asks for.
    pub fn new(config: Config, runtime: &dyn HostRuntime) -> PushResult<Self> {
        let tokens = AuthTokenStore::from_config(&config)?;
        Self::with_token_store(config, runtime, tokens)
    }

    /// Build a client over an explicit token store.
    pub fn with_token_store(
        config: Config,
        runtime: &dyn HostRuntime,
        tokens: AuthTokenStore,
    ) -> PushResult<Self> {
        let session = Session::new(ApiClient::from_config(&config)?, tokens);
        let event_store = EventLogStore::open(config.data_dir()?);

        let backend = match PlatformCapability::probe(runtime) {
            PlatformCapability::Standard(manager) => BackendHandle::Standard(Arc::new(
                StandardBackend::new(session.clone(), manager, config.domain.clone()),
            )),
            PlatformCapability::Vendor(vendor) => BackendHandle::Vendor(Arc::new(
                VendorBackend::new(session.clone(), vendor, config.website_push_id.clone()),
            )),
            PlatformCapability::Unsupported => BackendHandle::Unsupported,
        };

        Ok(Self {
            config,
            session,
            backend,
            event_store,
            state: Mutex::new(InitState::Start),
        })
    }

    /// Backend picked by the capability probe.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        match self.backend {
            BackendHandle::Standard(_) => Some(BackendKind::Standard),
            BackendHandle::Vendor(_) => Some(BackendKind::Vendor),
            BackendHandle::Unsupported => None,
        }
    }

    /// The selected backend.
    pub fn backend(&self) -> Option<Arc<dyn PushBackend>> {
        self.backend.as_dyn()
    }

    /// Token store shared by all authenticated calls.
    pub fn tokens(&self) -> &AuthTokenStore {
        self.session.tokens()
    }

    /// Durable event log store.
    pub fn event_store(&self) -> &EventLogStore {
        &self.event_store
    }

    /// Where the last `initialize` attempt got to.
    pub fn state(&self) -> InitState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn transition(&self, next: InitState) {
        log::debug!("[Init] {next:?}");
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = next;
    }

    /// Fetch and decode the server public key.
    pub async fn server_public_key(&self) -> PushResult<Vec<u8>> {
        let key = self.session.api().fetch_server_public_key().await?;
        decode_url_safe_base64(&key)
    }

    /// Run permission → subscription → activation.
    ///
    /// Denial and activation failure are outcomes, not errors. Errors are
    /// transport or platform failures.
    pub async fn initialize(&self) -> PushResult<InitOutcome> {
        self.transition(InitState::Start);
        let result = match &self.backend {
            BackendHandle::Standard(backend) => self.initialize_standard(backend).await,
            BackendHandle::Vendor(backend) => self.initialize_vendor(backend).await,
            BackendHandle::Unsupported => {
                log::warn!("[Init] Platform supports no push mechanism");
                Ok(InitOutcome::Unsupported)
            }
        };
        match result {
            Ok(outcome) => {
                self.transition(InitState::Done(outcome));
                Ok(outcome)
            }
            Err(e) => {
                log::warn!("[Init] Failed in {:?}: {e}", self.state());
                self.transition(InitState::Failed);
                Err(e)
            }
        }
    }

    async fn initialize_standard(&self, backend: &StandardBackend) -> PushResult<InitOutcome> {
        let manager = backend.manager();

        self.transition(InitState::RegisteringWorker);
        manager
            .register_service_worker(&self.config.service_worker_path)
            .await?;

        self.transition(InitState::RequestingPermission);
        match manager.request_permission().await? {
            PermissionState::Granted => {}
            PermissionState::Denied => {
                log::info!("[Init] {}", PushError::PermissionDenied);
                return Ok(InitOutcome::Denied);
            }
            PermissionState::Undetermined => return Ok(InitOutcome::Dismissed),
        }

        self.transition(InitState::Subscribing);
        let server_key = self.server_public_key().await?;
        let subscription = manager.subscribe(&server_key).await?;

        self.transition(InitState::Activating);
        if !backend.activate_subscription(&subscription).await {
            return Ok(InitOutcome::ActivationFailed);
        }

        if self.config.prefetch_token {
            match backend.mint_auth_token().await {
                Ok(true) => {}
                Ok(false) => log::warn!("[Init] Token prefetch failed"),
                Err(e) => log::warn!("[Init] Token prefetch failed: {e}"),
            }
        }
        Ok(InitOutcome::Granted)
    }

    async fn initialize_vendor(&self, backend: &VendorBackend) -> PushResult<InitOutcome> {
        let vendor = backend.vendor();
        let push_id = backend.website_push_id();

        self.transition(InitState::RequestingPermission);
        let mut permission = vendor.permission(push_id).await?;
        if permission.permission == PermissionState::Undetermined {
            // Resolves once the user has answered the prompt
            permission = vendor
                .request_permission(self.session.api().base_url(), push_id)
                .await?;
        }

        match permission.permission {
            PermissionState::Granted => {}
            PermissionState::Denied => {
                log::info!("[Init] {}", PushError::PermissionDenied);
                return Ok(InitOutcome::Denied);
            }
            PermissionState::Undetermined => return Ok(InitOutcome::Dismissed),
        }

        self.transition(InitState::Activating);
        match backend.get_vendor_device_id(&permission).await? {
            Some(id) => {
                log::info!("[Init] Vendor device id resolved: {id}");
                Ok(InitOutcome::Granted)
            }
            None => Ok(InitOutcome::ActivationFailed),
        }
    }

    /// Drop the push subscription and the cached token.
    ///
    /// `false` when there was nothing to unsubscribe. Vendor push has no
    /// client-side unsubscribe.
    pub async fn unsubscribe(&self) -> PushResult<bool> {
        let BackendHandle::Standard(backend) = &self.backend else {
            log::info!("[Unsubscribe] Not supported on this platform");
            return Ok(false);
        };

        let Some(subscription) = backend.manager().get_subscription().await? else {
            return Ok(false);
        };
        let unsubscribed = backend.manager().unsubscribe(&subscription).await?;
        if let Err(e) = self.tokens().clear_token().await {
            log::warn!("[Unsubscribe] Clearing auth token failed: {e}");
        }
        Ok(unsubscribed)
    }

    /// Normalize and send segments.
    ///
    /// A failed update is an error here, not `false`.
    pub async fn update_segments(&self, segments: &SegmentSet) -> PushResult<bool> {
        let Some(backend) = self.backend() else {
            return Err(PushError::SegmentUpdateFailed);
        };
        let normalized = normalize_segments(segments);
        if backend.update_segments(&normalized).await? {
            log::info!("[Segments] Updated {} segment(s)", normalized.len());
            Ok(true)
        } else {
            Err(PushError::SegmentUpdateFailed)
        }
    }

    /// Report the pending notification event, if any.
    pub async fn report_pending_event(&self) -> PushResult<ReportOutcome> {
        let Some(backend) = self.backend() else {
            return Ok(ReportOutcome::NothingPending);
        };
        EventLogUploader::new(self.event_store.clone(), backend)
            .report_pending()
            .await
    }
}
