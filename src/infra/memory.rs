//! In-process collection store.
//!
//! Writes are staged until `flush`, mirroring the transactional store: reads
//! see staged changes, `discard` drops them, and
//! [`InMemoryCollections::committed`] only reports what has been flushed.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    application::repos::{CollectionsRepo, RepoError},
    cache::lock::mutex_lock,
    domain::collections::{
        CollectionDraft, CollectionId, CollectionKey, CollectionRecord, CollectionType, Locale,
        UserId,
    },
};

const SOURCE: &str = "infra::memory";

/// A stored collection with all of its locale titles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCollection {
    pub id: CollectionId,
    pub key: Option<CollectionKey>,
    pub collection_type: CollectionType,
    pub parent_id: Option<CollectionId>,
    pub titles: BTreeMap<Locale, String>,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
}

impl StoredCollection {
    fn project(&self, locale: &Locale) -> CollectionRecord {
        CollectionRecord {
            id: self.id,
            key: self.key.clone(),
            collection_type: self.collection_type,
            parent_id: self.parent_id,
            locale: locale.clone(),
            title: self.titles.get(locale).cloned(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    committed: HashMap<CollectionId, StoredCollection>,
    staged: HashMap<CollectionId, StoredCollection>,
    saves: usize,
}

impl State {
    fn lookup(&self, id: CollectionId) -> Option<&StoredCollection> {
        self.staged.get(&id).or_else(|| self.committed.get(&id))
    }

    fn lookup_key(&self, key: &CollectionKey) -> Option<&StoredCollection> {
        self.staged
            .values()
            .find(|stored| stored.key.as_ref() == Some(key))
            .or_else(|| {
                self.committed
                    .values()
                    .find(|stored| stored.key.as_ref() == Some(key))
            })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCollections {
    state: Mutex<State>,
}

impl InMemoryCollections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flushed collections, sorted by key.
    pub fn committed(&self) -> Vec<StoredCollection> {
        let state = mutex_lock(&self.state, SOURCE, "committed");
        let mut collections: Vec<StoredCollection> = state.committed.values().cloned().collect();
        collections.sort_by(|left, right| left.key.cmp(&right.key));
        collections
    }

    pub fn get(&self, id: CollectionId) -> Option<StoredCollection> {
        mutex_lock(&self.state, SOURCE, "get")
            .committed
            .get(&id)
            .cloned()
    }

    /// Number of `save` calls since construction.
    pub fn save_count(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "save_count").saves
    }

    pub fn has_pending_writes(&self) -> bool {
        !mutex_lock(&self.state, SOURCE, "has_pending_writes")
            .staged
            .is_empty()
    }
}

#[async_trait]
impl CollectionsRepo for InMemoryCollections {
    async fn find_by_key(
        &self,
        key: &CollectionKey,
        locale: &Locale,
    ) -> Result<Option<CollectionRecord>, RepoError> {
        let state = mutex_lock(&self.state, SOURCE, "find_by_key");
        Ok(state.lookup_key(key).map(|stored| stored.project(locale)))
    }

    async fn save(
        &self,
        draft: CollectionDraft,
        actor: Option<UserId>,
    ) -> Result<CollectionRecord, RepoError> {
        let mut state = mutex_lock(&self.state, SOURCE, "save");
        state.saves += 1;

        let stored = match draft.id {
            Some(id) => {
                let mut stored = state.lookup(id).cloned().ok_or(RepoError::NotFound)?;
                stored.parent_id = draft.parent_id;
                stored.titles.insert(draft.locale.clone(), draft.title);
                stored.updated_by = actor;
                stored
            }
            None => {
                if state.lookup_key(&draft.key).is_some() {
                    return Err(RepoError::Duplicate {
                        constraint: "collections_collection_key_key".to_string(),
                    });
                }
                StoredCollection {
                    id: CollectionId::new_v4(),
                    key: Some(draft.key),
                    collection_type: draft.collection_type,
                    parent_id: draft.parent_id,
                    titles: BTreeMap::from([(draft.locale.clone(), draft.title)]),
                    created_by: actor,
                    updated_by: actor,
                }
            }
        };

        let record = stored.project(&draft.locale);
        state.staged.insert(stored.id, stored);
        Ok(record)
    }

    async fn flush(&self) -> Result<(), RepoError> {
        let mut state = mutex_lock(&self.state, SOURCE, "flush");
        let staged = std::mem::take(&mut state.staged);
        state.committed.extend(staged);
        Ok(())
    }

    async fn discard(&self) -> Result<(), RepoError> {
        mutex_lock(&self.state, SOURCE, "discard").staged.clear();
        Ok(())
    }
}
