//! Session and preferences store
//!
//! A single process-wide record holding:
//! - The active account identity
//! - The selected network environment
//! - Favorites and search history
//!
//! Every mutation is written through to the backing key-value store before
//! it becomes visible, so readers only ever observe committed state.

mod backend;
mod preferences;

pub use backend::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use preferences::{Preferences, MAX_HISTORY};

use crate::types::{Environment, Pubkey};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Key the preferences record is persisted under
pub const STORAGE_KEY: &str = "wallet-storage";

/// Thread-safe, write-through preferences state
#[derive(Clone)]
pub struct PreferencesStore {
    state: Arc<RwLock<Preferences>>,
    backend: Arc<dyn KeyValueStore>,
    notify: Arc<watch::Sender<Preferences>>,
}

impl PreferencesStore {
    /// Load the persisted record from `backend`, or start from defaults
    pub async fn load(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let prefs = match backend
            .get(STORAGE_KEY)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?
        {
            Some(content) => serde_json::from_str(&content).map_err(|e| {
                Error::Storage(format!("Corrupt preferences record: {}", e))
            })?,
            None => Preferences::default(),
        };

        tracing::debug!(
            favorites = prefs.favorites.len(),
            history = prefs.search_history.len(),
            environment = %prefs.environment(),
            "Loaded preferences"
        );

        let (notify, _) = watch::channel(prefs.clone());
        Ok(Self {
            state: Arc::new(RwLock::new(prefs)),
            backend,
            notify: Arc::new(notify),
        })
    }

    /// Open a file-backed store in `dir`
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::load(Arc::new(FileKeyValueStore::new(dir.as_ref()))).await
    }

    /// Ephemeral store, nothing survives the process
    pub fn in_memory() -> Self {
        let (notify, _) = watch::channel(Preferences::default());
        Self {
            state: Arc::new(RwLock::new(Preferences::default())),
            backend: Arc::new(MemoryKeyValueStore::new()),
            notify: Arc::new(notify),
        }
    }

    /// Apply `change` to a copy of the record, persist it, then commit
    ///
    /// The write lock is held across persistence so mutations are serialized
    /// and a failed write leaves the committed state untouched.
    async fn update<T>(&self, change: impl FnOnce(&mut Preferences) -> T) -> Result<T> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let out = change(&mut next);

        if next != *state {
            let content = serde_json::to_string(&next)?;
            self.backend
                .set(STORAGE_KEY, &content)
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;
            *state = next.clone();
            self.notify.send_replace(next);
        }

        Ok(out)
    }

    /// Snapshot of the full record
    pub async fn snapshot(&self) -> Preferences {
        self.state.read().await.clone()
    }

    /// Receiver notified after every committed change
    pub fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.notify.subscribe()
    }

    pub async fn active_identity(&self) -> Option<Pubkey> {
        self.state.read().await.active_identity
    }

    pub async fn set_active_identity(&self, identity: Option<Pubkey>) -> Result<()> {
        self.update(|p| p.active_identity = identity).await
    }

    pub async fn environment(&self) -> Environment {
        self.state.read().await.environment()
    }

    pub async fn set_environment(&self, environment: Environment) -> Result<()> {
        self.update(|p| p.set_environment(environment)).await?;
        tracing::info!(environment = %environment, "Network environment set");
        Ok(())
    }

    /// Flip between devnet and mainnet, returning the new environment
    pub async fn toggle_network(&self) -> Result<Environment> {
        let environment = self
            .update(|p| {
                p.toggle_network();
                p.environment()
            })
            .await?;
        tracing::info!(environment = %environment, "Network environment toggled");
        Ok(environment)
    }

    pub async fn favorites(&self) -> Vec<String> {
        self.state.read().await.favorites.clone()
    }

    pub async fn add_favorite(&self, address: &str) -> Result<()> {
        self.update(|p| p.add_favorite(address)).await.map(|_| ())
    }

    pub async fn remove_favorite(&self, address: &str) -> Result<()> {
        self.update(|p| p.remove_favorite(address)).await.map(|_| ())
    }

    pub async fn is_favorite(&self, address: &str) -> bool {
        self.state.read().await.is_favorite(address)
    }

    pub async fn search_history(&self) -> Vec<String> {
        self.state.read().await.search_history.clone()
    }

    pub async fn add_to_history(&self, address: &str) -> Result<()> {
        self.update(|p| p.add_to_history(address)).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.update(|p| p.clear_history()).await
    }
}
