//! Provisioning and lookup of system collections.
//!
//! The configured [`CollectionTree`] is materialised in the collection store
//! on first use and the resulting key → id map is kept in two tiers: the
//! [`FreshnessCache`] shared across processes and a process-local copy held
//! by the manager.

use std::{future::Future, pin::Pin, sync::Arc, time::Instant};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{
    application::repos::{CollectionsRepo, RepoError},
    cache::{CacheError, FreshnessCache},
    domain::{
        collections::{
            CollectionDraft, CollectionId, CollectionKey, CollectionType, Locale,
            LocalizedTitles, ROOT_MAP_KEY, ROOT_TITLE, SystemCollectionMap, UserId,
        },
        tree::{CollectionSpec, CollectionTree},
    },
};

const REBUILD_TOTAL: &str = "vellum_system_collections_rebuild_total";
const REBUILD_MS: &str = "vellum_system_collections_rebuild_ms";

type ProvisionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SystemCollectionMap, RepoError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum SystemCollectionError {
    #[error("system collection `{key}` is not configured (known keys: {})", .valid_keys.join(", "))]
    Unrecognized { key: String, valid_keys: Vec<String> },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Runtime parameters for provisioning.
#[derive(Debug, Clone)]
pub struct SystemCollectionSettings {
    /// Locale the root collection is looked up and titled in.
    pub locale: Locale,
    /// User that created/updated collections are attributed to.
    pub actor: Option<UserId>,
}

pub struct SystemCollectionManager {
    tree: CollectionTree,
    repo: Arc<dyn CollectionsRepo>,
    cache: Arc<dyn FreshnessCache>,
    settings: SystemCollectionSettings,
    resolved: Mutex<Option<Arc<SystemCollectionMap>>>,
}

impl SystemCollectionManager {
    pub fn new(
        tree: CollectionTree,
        repo: Arc<dyn CollectionsRepo>,
        cache: Arc<dyn FreshnessCache>,
        settings: SystemCollectionSettings,
    ) -> Self {
        Self {
            tree,
            repo,
            cache,
            settings,
            resolved: Mutex::new(None),
        }
    }

    /// Invalidate both cache tiers and rebuild the map from the store.
    pub async fn warm_up(&self) -> Result<(), SystemCollectionError> {
        let mut resolved = self.resolved.lock().await;
        self.cache.invalidate().await?;
        *resolved = None;
        self.resolve(&mut resolved).await.map(|_| ())
    }

    /// Identifier of the collection registered under `key`.
    pub async fn get_system_collection(
        &self,
        key: &str,
    ) -> Result<CollectionId, SystemCollectionError> {
        let map = self.system_collections().await?;
        map.get(key)
            .ok_or_else(|| SystemCollectionError::Unrecognized {
                key: key.to_string(),
                valid_keys: map.keys(),
            })
    }

    pub async fn is_system_collection(
        &self,
        id: CollectionId,
    ) -> Result<bool, SystemCollectionError> {
        Ok(self.system_collections().await?.contains_id(id))
    }

    /// The current map, built on first access.
    pub async fn system_collections(
        &self,
    ) -> Result<Arc<SystemCollectionMap>, SystemCollectionError> {
        let mut resolved = self.resolved.lock().await;
        if let Some(map) = resolved.as_ref() {
            return Ok(Arc::clone(map));
        }
        self.resolve(&mut resolved).await
    }

    async fn resolve(
        &self,
        resolved: &mut MutexGuard<'_, Option<Arc<SystemCollectionMap>>>,
    ) -> Result<Arc<SystemCollectionMap>, SystemCollectionError> {
        if !self.cache.is_fresh().await? {
            let map = self.build().await?;
            self.cache.write(&map).await?;
        }

        let map = Arc::new(self.cache.read().await?);
        **resolved = Some(Arc::clone(&map));
        Ok(map)
    }

    async fn build(&self) -> Result<SystemCollectionMap, RepoError> {
        let started_at = Instant::now();
        let map = match self.provision_all().await {
            Ok(map) => map,
            Err(err) => {
                self.discard_pending(&err).await;
                return Err(err);
            }
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        counter!(REBUILD_TOTAL).increment(1);
        histogram!(REBUILD_MS).record(elapsed_ms as f64);
        info!(
            target = "vellum::system_collections",
            op = "system_collections::build",
            result = "ok",
            collections = map.len(),
            elapsed_ms,
            "System collections provisioned"
        );

        Ok(map)
    }

    async fn provision_all(&self) -> Result<SystemCollectionMap, RepoError> {
        let root = self.provision_root().await?;

        let mut map = SystemCollectionMap::new();
        map.insert(ROOT_MAP_KEY, root);
        map.extend(
            self.provision_nodes(self.tree.nodes(), Some(root), None)
                .await?,
        );

        self.repo.flush().await?;
        Ok(map)
    }

    /// Throw away writes staged by a rebuild that did not complete, so the
    /// next attempt starts from committed state.
    async fn discard_pending(&self, cause: &RepoError) {
        match self.repo.discard().await {
            Ok(()) => warn!(
                target = "vellum::system_collections",
                op = "system_collections::build",
                result = "discarded",
                error = %cause,
                "System collection rebuild failed; pending writes discarded"
            ),
            Err(discard_err) => warn!(
                target = "vellum::system_collections",
                op = "system_collections::build",
                result = "discard_failed",
                error = %cause,
                discard_error = %discard_err,
                "System collection rebuild failed and pending writes could not be discarded"
            ),
        }
    }

    /// Depth-first walk returning the map of this subtree; siblings later in
    /// configuration order win on equal keys.
    fn provision_nodes<'a>(
        &'a self,
        nodes: &'a [CollectionSpec],
        parent: Option<CollectionId>,
        namespace: Option<&'a CollectionKey>,
    ) -> ProvisionFuture<'a> {
        Box::pin(async move {
            let mut map = SystemCollectionMap::new();
            for node in nodes {
                let key = CollectionKey::nested(namespace, &node.key);
                let id = self
                    .provision_collection(&key, &node.meta_title, parent)
                    .await?;
                map.insert(key.as_str(), id);

                if !node.collections.is_empty() {
                    let children = self
                        .provision_nodes(&node.collections, Some(id), Some(&key))
                        .await?;
                    map.extend(children);
                }
            }
            Ok(map)
        })
    }

    async fn provision_root(&self) -> Result<CollectionId, RepoError> {
        let titles = LocalizedTitles::single(self.settings.locale.clone(), ROOT_TITLE);
        self.provision_collection(&CollectionKey::root_namespace(), &titles, None)
            .await
    }

    /// Get-or-create by key in the primary locale, then write every other
    /// locale as an update of the same collection.
    async fn provision_collection(
        &self,
        key: &CollectionKey,
        titles: &LocalizedTitles,
        parent: Option<CollectionId>,
    ) -> Result<CollectionId, RepoError> {
        let primary = titles.primary();
        let existing = self.repo.find_by_key(key, &primary.locale).await?;
        let result = if existing.is_some() { "updated" } else { "created" };

        let record = self
            .repo
            .save(
                self.draft(
                    existing.map(|record| record.id),
                    key,
                    &primary.title,
                    &primary.locale,
                    parent,
                ),
                self.settings.actor,
            )
            .await?;

        for variant in titles.variants() {
            self.repo
                .save(
                    self.draft(
                        Some(record.id),
                        key,
                        &variant.title,
                        &variant.locale,
                        parent,
                    ),
                    self.settings.actor,
                )
                .await?;
        }

        debug!(
            target = "vellum::system_collections",
            op = "system_collections::provision",
            result,
            key = %key,
            id = %record.id,
            locales = titles.len(),
            "System collection provisioned"
        );

        Ok(record.id)
    }

    fn draft(
        &self,
        id: Option<CollectionId>,
        key: &CollectionKey,
        title: &str,
        locale: &Locale,
        parent_id: Option<CollectionId>,
    ) -> CollectionDraft {
        CollectionDraft {
            id,
            key: key.clone(),
            title: title.to_string(),
            locale: locale.clone(),
            parent_id,
            collection_type: CollectionType::System,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    use crate::cache::MemoryFreshnessCache;
    use crate::domain::collections::{CollectionRecord, KeySegment, LocalizedTitle};

    #[derive(Default)]
    struct RecordingRepo {
        existing: StdMutex<Vec<CollectionRecord>>,
        saved: StdMutex<Vec<(CollectionDraft, Option<UserId>)>>,
        lookups: StdMutex<Vec<(String, String)>>,
        flushes: StdMutex<usize>,
        discards: StdMutex<usize>,
        fail_flush: bool,
        fail_save_key: Option<&'static str>,
    }

    impl RecordingRepo {
        fn saved(&self) -> Vec<(CollectionDraft, Option<UserId>)> {
            self.saved.lock().expect("saved lock").clone()
        }

        fn lookups(&self) -> usize {
            self.lookups.lock().expect("lookups lock").len()
        }

        fn discards(&self) -> usize {
            *self.discards.lock().expect("discards lock")
        }
    }

    #[async_trait]
    impl CollectionsRepo for RecordingRepo {
        async fn find_by_key(
            &self,
            key: &CollectionKey,
            locale: &Locale,
        ) -> Result<Option<CollectionRecord>, RepoError> {
            self.lookups
                .lock()
                .expect("lookups lock")
                .push((key.to_string(), locale.to_string()));
            Ok(self
                .existing
                .lock()
                .expect("existing lock")
                .iter()
                .find(|record| record.key.as_ref() == Some(key))
                .cloned())
        }

        async fn save(
            &self,
            draft: CollectionDraft,
            actor: Option<UserId>,
        ) -> Result<CollectionRecord, RepoError> {
            if self.fail_save_key == Some(draft.key.as_str()) {
                return Err(RepoError::from_persistence("connection reset"));
            }
            let record = CollectionRecord {
                id: draft.id.unwrap_or_else(CollectionId::new_v4),
                key: Some(draft.key.clone()),
                collection_type: draft.collection_type,
                parent_id: draft.parent_id,
                locale: draft.locale.clone(),
                title: Some(draft.title.clone()),
            };
            if draft.id.is_none() {
                self.existing
                    .lock()
                    .expect("existing lock")
                    .push(record.clone());
            }
            self.saved.lock().expect("saved lock").push((draft, actor));
            Ok(record)
        }

        async fn flush(&self) -> Result<(), RepoError> {
            if self.fail_flush {
                return Err(RepoError::Timeout);
            }
            *self.flushes.lock().expect("flushes lock") += 1;
            Ok(())
        }

        async fn discard(&self) -> Result<(), RepoError> {
            *self.discards.lock().expect("discards lock") += 1;
            Ok(())
        }
    }

    fn locale(raw: &str) -> Locale {
        Locale::parse(raw).expect("locale")
    }

    fn spec(key: &str, titles: &[(&str, &str)]) -> CollectionSpec {
        let titles = titles
            .iter()
            .map(|(code, title)| LocalizedTitle::new(locale(code), *title))
            .collect();
        CollectionSpec::new(
            KeySegment::parse(key).expect("segment"),
            LocalizedTitles::new(titles).expect("titles"),
        )
    }

    fn manager(
        tree: CollectionTree,
        repo: Arc<RecordingRepo>,
        cache: Arc<MemoryFreshnessCache>,
    ) -> SystemCollectionManager {
        SystemCollectionManager::new(
            tree,
            repo,
            cache,
            SystemCollectionSettings {
                locale: locale("en"),
                actor: Some(UserId::new(7)),
            },
        )
    }

    #[tokio::test]
    async fn root_is_created_without_parent_and_titled_system() {
        let repo = Arc::new(RecordingRepo::default());
        let cache = Arc::new(MemoryFreshnessCache::new());
        let manager = manager(CollectionTree::empty(), repo.clone(), cache);

        let root = manager
            .get_system_collection("root")
            .await
            .expect("root id");

        let saved = repo.saved();
        assert_eq!(saved.len(), 1);
        let (draft, actor) = &saved[0];
        assert_eq!(draft.key.as_str(), "system_collections");
        assert_eq!(draft.title, "System");
        assert_eq!(draft.parent_id, None);
        assert_eq!(draft.collection_type, CollectionType::System);
        assert_eq!(*actor, Some(UserId::new(7)));
        assert!(manager.is_system_collection(root).await.expect("lookup"));
    }

    #[tokio::test]
    async fn nested_nodes_hang_below_their_parent() {
        let tree = CollectionTree::new(vec![
            spec("news", &[("en", "News")]).with_child(spec("articles", &[("en", "Articles")])),
        ])
        .expect("tree");
        let repo = Arc::new(RecordingRepo::default());
        let cache = Arc::new(MemoryFreshnessCache::new());
        let manager = manager(tree, repo.clone(), cache);

        let map = manager.system_collections().await.expect("map");
        assert_eq!(map.keys(), ["news", "news.articles", "root"]);

        let saved = repo.saved();
        let news = saved
            .iter()
            .find(|(draft, _)| draft.key.as_str() == "news")
            .expect("news draft");
        let articles = saved
            .iter()
            .find(|(draft, _)| draft.key.as_str() == "news.articles")
            .expect("articles draft");
        assert_eq!(news.0.parent_id, map.root());
        assert_eq!(articles.0.parent_id, map.get("news"));
    }

    #[tokio::test]
    async fn secondary_locales_update_the_primary_collection() {
        let tree = CollectionTree::new(vec![spec(
            "news",
            &[("en", "News"), ("de", "Neuigkeiten")],
        )])
        .expect("tree");
        let repo = Arc::new(RecordingRepo::default());
        let cache = Arc::new(MemoryFreshnessCache::new());
        let manager = manager(tree, repo.clone(), cache);

        let news = manager.get_system_collection("news").await.expect("news");

        let drafts: Vec<CollectionDraft> = repo
            .saved()
            .into_iter()
            .map(|(draft, _)| draft)
            .filter(|draft| draft.key.as_str() == "news")
            .collect();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].locale.as_str(), "en");
        assert_eq!(drafts[0].id, None);
        assert_eq!(drafts[1].locale.as_str(), "de");
        assert_eq!(drafts[1].id, Some(news));
        assert_eq!(drafts[1].title, "Neuigkeiten");
    }

    #[tokio::test]
    async fn existing_collections_are_updated_in_place() {
        let existing_id = CollectionId::new_v4();
        let repo = Arc::new(RecordingRepo::default());
        repo.existing
            .lock()
            .expect("existing lock")
            .push(CollectionRecord {
                id: existing_id,
                key: Some(CollectionKey::top_level(
                    &KeySegment::parse("news").expect("segment"),
                )),
                collection_type: CollectionType::System,
                parent_id: None,
                locale: locale("en"),
                title: Some("Old".to_string()),
            });
        let tree = CollectionTree::new(vec![spec("news", &[("en", "News")])]).expect("tree");
        let manager = manager(tree, repo.clone(), Arc::new(MemoryFreshnessCache::new()));

        let news = manager.get_system_collection("news").await.expect("news");

        assert_eq!(news, existing_id);
        let update = repo
            .saved()
            .into_iter()
            .find(|(draft, _)| draft.key.as_str() == "news")
            .expect("news draft");
        assert_eq!(update.0.id, Some(existing_id));
        assert_eq!(update.0.title, "News");
    }

    #[tokio::test]
    async fn unknown_key_lists_valid_keys() {
        let tree = CollectionTree::new(vec![
            spec("news", &[("en", "News")]).with_child(spec("articles", &[("en", "Articles")])),
        ])
        .expect("tree");
        let manager = manager(
            tree,
            Arc::new(RecordingRepo::default()),
            Arc::new(MemoryFreshnessCache::new()),
        );

        let err = manager
            .get_system_collection("nonexistent")
            .await
            .expect_err("unknown key");

        match err {
            SystemCollectionError::Unrecognized { key, valid_keys } => {
                assert_eq!(key, "nonexistent");
                assert_eq!(valid_keys, ["news", "news.articles", "root"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_store() {
        let mut cached = SystemCollectionMap::new();
        let root = CollectionId::new_v4();
        cached.insert(ROOT_MAP_KEY, root);
        let repo = Arc::new(RecordingRepo::default());
        let cache = Arc::new(MemoryFreshnessCache::with_map(cached.clone()));
        let manager = manager(CollectionTree::empty(), repo.clone(), cache.clone());

        let map = manager.system_collections().await.expect("map");

        assert_eq!(*map, cached);
        assert_eq!(repo.lookups(), 0);
        assert!(repo.saved().is_empty());
        assert_eq!(cache.write_count(), 0);
    }

    #[tokio::test]
    async fn map_is_memoized_per_manager() {
        let repo = Arc::new(RecordingRepo::default());
        let cache = Arc::new(MemoryFreshnessCache::new());
        let manager = manager(CollectionTree::empty(), repo.clone(), cache.clone());

        let first = manager.system_collections().await.expect("first");
        cache.invalidate().await.expect("invalidate");
        let second = manager.system_collections().await.expect("second");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(repo.lookups(), 1);
    }

    #[tokio::test]
    async fn warm_up_always_rebuilds() {
        let repo = Arc::new(RecordingRepo::default());
        let cache = Arc::new(MemoryFreshnessCache::new());
        let manager = manager(CollectionTree::empty(), repo.clone(), cache.clone());

        manager.warm_up().await.expect("first warm up");
        manager.warm_up().await.expect("second warm up");

        assert_eq!(cache.write_count(), 2);
        assert_eq!(*repo.flushes.lock().expect("flushes lock"), 2);
    }

    #[tokio::test]
    async fn failed_flush_leaves_both_tiers_empty() {
        let repo = Arc::new(RecordingRepo {
            fail_flush: true,
            ..RecordingRepo::default()
        });
        let cache = Arc::new(MemoryFreshnessCache::new());
        let manager = manager(CollectionTree::empty(), repo.clone(), cache.clone());

        let err = manager.system_collections().await.expect_err("flush fails");
        assert!(matches!(
            err,
            SystemCollectionError::Repo(RepoError::Timeout)
        ));
        assert!(cache.snapshot().is_none());
        assert_eq!(repo.discards(), 1);

        let _ = manager.system_collections().await;
        assert_eq!(repo.lookups(), 2);
    }

    #[tokio::test]
    async fn failed_save_discards_pending_writes_without_flushing() {
        let tree = CollectionTree::new(vec![
            spec("news", &[("en", "News")]).with_child(spec("articles", &[("en", "Articles")])),
        ])
        .expect("tree");
        let repo = Arc::new(RecordingRepo {
            fail_save_key: Some("news.articles"),
            ..RecordingRepo::default()
        });
        let cache = Arc::new(MemoryFreshnessCache::new());
        let manager = manager(tree, repo.clone(), cache.clone());

        let err = manager.warm_up().await.expect_err("save fails");

        assert!(matches!(err, SystemCollectionError::Repo(RepoError::Persistence(_))));
        assert_eq!(repo.discards(), 1);
        assert_eq!(*repo.flushes.lock().expect("flushes lock"), 0);
        assert_eq!(cache.write_count(), 0);
    }

    #[tokio::test]
    async fn successful_rebuild_does_not_discard() {
        let repo = Arc::new(RecordingRepo::default());
        let manager = manager(
            CollectionTree::empty(),
            repo.clone(),
            Arc::new(MemoryFreshnessCache::new()),
        );

        manager.warm_up().await.expect("warm up");

        assert_eq!(repo.discards(), 0);
    }

    #[tokio::test]
    async fn concurrent_first_access_builds_once() {
        let repo = Arc::new(RecordingRepo::default());
        let cache = Arc::new(MemoryFreshnessCache::new());
        let manager = Arc::new(manager(CollectionTree::empty(), repo.clone(), cache.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_system_collection("root").await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.expect("join").expect("root id"));
        }

        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(cache.write_count(), 1);
        assert_eq!(repo.saved().len(), 1);
    }
}
