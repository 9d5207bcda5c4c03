/// Process-wide store handles shared by every request.
///
/// The text store is loaded before the server starts accepting requests; the
/// PM-JAY store is loaded by a background task and stays unset until it is
/// ready (or forever, if loading fails).
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{Mutex as TokioMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::store::{Collection, StoreLoader, VectorStore};

pub struct AppState {
    pub config: Arc<Config>,
    loader: Arc<dyn StoreLoader>,
    text: RwLock<Arc<VectorStore>>,
    pmjay: RwLock<Option<Arc<VectorStore>>>,
    rebuilding: TokioMutex<()>,
}

impl AppState {
    pub fn new(config: Arc<Config>, loader: Arc<dyn StoreLoader>, text: VectorStore) -> Self {
        Self {
            config,
            loader,
            text: RwLock::new(Arc::new(text)),
            pmjay: RwLock::new(None),
            rebuilding: TokioMutex::new(()),
        }
    }

    /// Load the text store, then start loading the PM-JAY store in the
    /// background when `load_pmjay` is set. `force_rebuild` goes to both
    /// loaders unchanged.
    ///
    /// Returns the handle of the background load so callers can wait on it.
    pub async fn startup(
        config: Arc<Config>,
        loader: Arc<dyn StoreLoader>,
        force_rebuild: bool,
        load_pmjay: bool,
    ) -> Result<(Arc<Self>, Option<JoinHandle<()>>)> {
        info!("Loading vector stores...");
        let text = load_blocking(loader.clone(), Collection::Text, force_rebuild).await?;
        let state = Arc::new(Self::new(config, loader, text));

        let pending = load_pmjay.then(|| tokio::spawn(state.clone().load_pmjay(force_rebuild)));
        Ok((state, pending))
    }

    async fn load_pmjay(self: Arc<Self>, force_rebuild: bool) {
        match load_blocking(self.loader.clone(), Collection::Pmjay, force_rebuild).await {
            Ok(store) => {
                *self.pmjay.write().await = Some(Arc::new(store));
                info!("PM-JAY vector store ready");
            }
            Err(e) => error!("Failed to load PM-JAY vector store: {e:#}"),
        }
    }

    /// Current handle for `collection`, if it has been loaded.
    pub async fn store(&self, collection: Collection) -> Option<Arc<VectorStore>> {
        match collection {
            Collection::Text => Some(self.text.read().await.clone()),
            Collection::Pmjay => self.pmjay.read().await.clone(),
        }
    }

    /// Rebuild `collection` from its sources and swap in the new handle.
    ///
    /// Returns `false` without building when the PM-JAY store has never
    /// loaded. Requests already holding the old handle finish against it.
    /// The rebuild runs as its own task, so the rebuild lock is held until
    /// the index is fully written even if the caller goes away.
    pub async fn rebuild(self: &Arc<Self>, collection: Collection) -> Result<bool> {
        let state = self.clone();
        tokio::spawn(async move { state.rebuild_locked(collection).await })
            .await
            .context("rebuild task panicked")?
    }

    async fn rebuild_locked(&self, collection: Collection) -> Result<bool> {
        let _guard = self.rebuilding.lock().await;

        if collection == Collection::Pmjay && self.pmjay.read().await.is_none() {
            warn!("Ignoring rebuild of PM-JAY vector store: not loaded yet");
            return Ok(false);
        }

        let store = Arc::new(load_blocking(self.loader.clone(), collection, true).await?);
        match collection {
            Collection::Text => *self.text.write().await = store,
            Collection::Pmjay => *self.pmjay.write().await = Some(store),
        }
        info!("Rebuilt {collection} vector store");
        Ok(true)
    }
}

/// Loading embeds documents and may download files, so keep it off the
/// async workers.
async fn load_blocking(
    loader: Arc<dyn StoreLoader>,
    collection: Collection,
    force_rebuild: bool,
) -> Result<VectorStore> {
    tokio::task::spawn_blocking(move || loader.load(collection, force_rebuild))
        .await
        .context("store loader task panicked")?
        .with_context(|| format!("failed to load {collection} vector store"))
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingLoader;
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_startup_passes_rebuild_flag_to_both_loaders() {
        for flag in [false, true] {
            let loader = Arc::new(RecordingLoader::new());
            let (state, pending) =
                AppState::startup(Arc::new(Config::default()), loader.clone(), flag, true)
                    .await
                    .unwrap();
            pending.unwrap().await.unwrap();

            assert_eq!(
                loader.calls(),
                vec![(Collection::Text, flag), (Collection::Pmjay, flag)]
            );
            assert!(state.store(Collection::Pmjay).await.is_some());
        }
    }

    #[tokio::test]
    async fn test_pmjay_unset_when_disabled_or_failed() {
        let loader = Arc::new(RecordingLoader::new());
        let (state, pending) = AppState::startup(Arc::new(Config::default()), loader, false, false)
            .await
            .unwrap();
        assert!(pending.is_none());
        assert!(state.store(Collection::Pmjay).await.is_none());
        assert!(state.store(Collection::Text).await.is_some());

        let mut failing = RecordingLoader::new();
        failing.fail_pmjay = true;
        let (state, pending) =
            AppState::startup(Arc::new(Config::default()), Arc::new(failing), false, true)
                .await
                .unwrap();
        pending.unwrap().await.unwrap();
        assert!(state.store(Collection::Pmjay).await.is_none());
    }

    #[tokio::test]
    async fn test_rebuild_swaps_handle() {
        let (state, loader) = testing::loaded_state(Config::default()).await;
        let before = state.store(Collection::Text).await.unwrap();

        assert!(state.rebuild(Collection::Text).await.unwrap());
        let after = state.store(Collection::Text).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(loader.calls().last(), Some(&(Collection::Text, true)));
    }

    #[tokio::test]
    async fn test_abandoned_rebuild_keeps_lock_until_done() {
        let mut loader = RecordingLoader::new();
        loader.delay = Duration::from_millis(150);
        let loader = Arc::new(loader);
        let (state, _) = AppState::startup(Arc::new(Config::default()), loader.clone(), false, false)
            .await
            .unwrap();

        // Caller gives up while the first rebuild is still loading
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), state.rebuild(Collection::Text)).await;
        assert!(abandoned.is_err());

        assert!(state.rebuild(Collection::Text).await.unwrap());
        assert_eq!(loader.rebuild_count(Collection::Text), 2);
        assert!(!loader.overlapped());
    }

    #[tokio::test]
    async fn test_rebuild_pmjay_before_load_is_refused() {
        let loader = Arc::new(RecordingLoader::new());
        let (state, _) = AppState::startup(Arc::new(Config::default()), loader.clone(), false, false)
            .await
            .unwrap();

        assert!(!state.rebuild(Collection::Pmjay).await.unwrap());
        assert_eq!(loader.calls(), vec![(Collection::Text, false)]);
        assert!(state.store(Collection::Pmjay).await.is_none());
    }
}
