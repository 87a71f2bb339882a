//! Auth token store: the single durable bearer-token slot for an origin.
//!
//! # Storage
//!
//! Production: OS keyring entry `pushbridge/auth-token:{origin}`.
//! File mode (tests, headless hosts): `{data_dir}/auth_token.json`.
//! Memory mode: process-local, for embedding and tests.
//!
//! The token carries no expiry the client can read. The backend enforces a
//! 60 minute validity window and rejects stale tokens with 401; that is the
//! only expiry signal.
//!
//! Callers get copies of the token. The store is cheap to clone and all
//! clones share the same slot.
//!
//! All slot access is async. File I/O goes through `tokio::fs`; keyring calls
//! are blocking platform APIs and run on the blocking pool.

use keyring::Entry;
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs;

use crate::config::{Config, TokenStorage};
use crate::error::{PushError, PushResult};

/// Keyring service name.
const KEYRING_SERVICE: &str = "pushbridge";
/// Token file name in file mode.
const TOKEN_FILE: &str = "auth_token.json";

/// Per-process counter keeping concurrent writers off each other's temp file.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// On-disk form of the slot.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    id_token: String,
}

#[derive(Debug)]
enum TokenSlot {
    File(PathBuf),
    Keyring { origin: String },
    Memory(Mutex<Option<String>>),
}

/// Durable, origin-scoped auth token slot.
#[derive(Debug, Clone)]
pub struct AuthTokenStore {
    slot: Arc<TokenSlot>,
}

impl AuthTokenStore {
    /// Token file under `dir`.
    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self {
            slot: Arc::new(TokenSlot::File(dir.into().join(TOKEN_FILE))),
        }
    }

    /// OS keyring entry scoped to `origin`.
    pub fn keyring(origin: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(TokenSlot::Keyring {
                origin: origin.into(),
            }),
        }
    }

    /// Process-local slot.
    pub fn memory() -> Self {
        Self {
            slot: Arc::new(TokenSlot::Memory(Mutex::new(None))),
        }
    }

    /// Build the store the configuration asks for.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(match config.token_storage {
            TokenStorage::Keyring if !crate::env::should_skip_keyring() => {
                Self::keyring(config.origin())
            }
            _ => Self::file(config.data_dir()?),
        })
    }

    /// Current token, if one is cached.
    pub async fn get_cached_token(&self) -> PushResult<Option<String>> {
        match self.slot.as_ref() {
            TokenSlot::File(path) => {
                let content = match fs::read_to_string(path).await {
                    Ok(content) => content,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                match serde_json::from_str::<StoredToken>(&content) {
                    Ok(stored) if !stored.id_token.is_empty() => Ok(Some(stored.id_token)),
                    Ok(_) => Ok(None),
                    Err(e) => {
                        // A corrupt slot is as good as an empty one; the next mint replaces it
                        log::warn!("[Auth] Ignoring unreadable token file {}: {e}", path.display());
                        Ok(None)
                    }
                }
            }
            TokenSlot::Keyring { origin } => {
                let entry = keyring_entry(origin)?;
                match blocking(move || entry.get_password()).await? {
                    Ok(token) if !token.is_empty() => Ok(Some(token)),
                    Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            TokenSlot::Memory(cell) => Ok(lock(cell).clone()),
        }
    }

    /// Replace the cached token.
    pub async fn set_token(&self, token: &str) -> PushResult<()> {
        match self.slot.as_ref() {
            TokenSlot::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                let content = serde_json::to_string(&StoredToken {
                    id_token: token.to_string(),
                })?;
                // Write-then-rename so readers never see a half-written slot
                let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
                let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
                fs::write(&tmp, content).await?;
                #[cfg(unix)]
                fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
                if let Err(e) = fs::rename(&tmp, path).await {
                    let _ = fs::remove_file(&tmp).await;
                    return Err(e.into());
                }
            }
            TokenSlot::Keyring { origin } => {
                let entry = keyring_entry(origin)?;
                let token = token.to_string();
                blocking(move || entry.set_password(&token)).await??;
            }
            TokenSlot::Memory(cell) => *lock(cell) = Some(token.to_string()),
        }
        log::debug!("[Auth] Stored auth token");
        Ok(())
    }

    /// Drop the cached token. Clearing an empty slot is not an error.
    pub async fn clear_token(&self) -> PushResult<()> {
        match self.slot.as_ref() {
            TokenSlot::File(path) => match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
            TokenSlot::Keyring { origin } => {
                let entry = keyring_entry(origin)?;
                match blocking(move || entry.delete_credential()).await? {
                    Ok(()) | Err(keyring::Error::NoEntry) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            TokenSlot::Memory(cell) => *lock(cell) = None,
        }
        Ok(())
    }
}

fn keyring_entry(origin: &str) -> PushResult<Entry> {
    Entry::new(KEYRING_SERVICE, &format!("auth-token:{origin}")).map_err(PushError::from)
}

/// Run a keyring call on the blocking pool.
async fn blocking<T, F>(f: F) -> PushResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PushError::Keyring(format!("keyring task failed: {e}")))
}

fn lock(cell: &Mutex<Option<String>>) -> std::sync::MutexGuard<'_, Option<String>> {
    // The slot holds a plain value; a poisoned lock still has a usable one
    cell.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_slot_lifecycle() {
        let store = AuthTokenStore::memory();
        assert_eq!(store.get_cached_token().await.unwrap(), None);

        store.set_token("tok_1").await.unwrap();
        assert_eq!(store.get_cached_token().await.unwrap().as_deref(), Some("tok_1"));

        store.clear_token().await.unwrap();
        assert_eq!(store.get_cached_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clones_share_the_slot() {
        let store = AuthTokenStore::memory();
        let other = store.clone();
        store.set_token("shared").await.unwrap();
        assert_eq!(other.get_cached_token().await.unwrap().as_deref(), Some("shared"));
    }

    #[tokio::test]
    async fn test_file_slot_survives_reload() {
        let dir = TempDir::new().unwrap();
        AuthTokenStore::file(dir.path()).set_token("tok_durable").await.unwrap();

        // A fresh store over the same directory sees the token
        let reloaded = AuthTokenStore::file(dir.path());
        assert_eq!(reloaded.get_cached_token().await.unwrap().as_deref(), Some("tok_durable"));
    }

    #[tokio::test]
    async fn test_file_slot_clear_when_empty() {
        let dir = TempDir::new().unwrap();
        let store = AuthTokenStore::file(dir.path().join("nested"));
        store.clear_token().await.unwrap();
        assert_eq!(store.get_cached_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_slot_ignores_corrupt_content() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), "{not json").unwrap();
        let store = AuthTokenStore::file(dir.path());
        assert_eq!(store.get_cached_token().await.unwrap(), None);

        store.set_token("fresh").await.unwrap();
        assert_eq!(store.get_cached_token().await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_from_config_uses_file_slot_under_tests() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            token_storage: TokenStorage::Keyring,
            ..Config::default()
        };
        let store = AuthTokenStore::from_config(&config).unwrap();
        store.set_token("t").await.unwrap();
        assert!(dir.path().join(TOKEN_FILE).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_file_writes_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = AuthTokenStore::file(dir.path());

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.set_token(&format!("tok-{i}")).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let token = store.get_cached_token().await.unwrap().unwrap();
        assert!(token.starts_with("tok-"));
        // No temp files are left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name != TOKEN_FILE)
            .collect();
        assert!(leftovers.is_empty(), "stray files: {leftovers:?}");
    }
}
