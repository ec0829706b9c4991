//! HashMap-backed stores for tests, demos, and the default service wiring.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::domain::{NoteId, RecordId};
use super::store::{
    ContentItem, ContentPatch, ContentQuery, ContentStore, MetaStore, MetaValue, NewContentItem,
    NewNoteRecord, NoteRecord, NoteStore, StoreError,
};

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[derive(Default)]
struct ContentState {
    next_id: u64,
    items: BTreeMap<RecordId, ContentItem>,
    meta: HashMap<RecordId, HashMap<String, MetaValue>>,
}

/// In-memory content items with attached meta. Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    state: Arc<RwLock<ContentState>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ContentState>, StoreError> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ContentState>, StoreError> {
        self.state.write().map_err(|_| poisoned())
    }

    /// Number of stored items of `kind`.
    pub fn count_kind(&self, kind: &str) -> usize {
        self.read()
            .map(|state| state.items.values().filter(|item| item.kind == kind).count())
            .unwrap_or_default()
    }
}

impl ContentStore for MemoryContentStore {
    fn fetch(&self, id: RecordId) -> Result<Option<ContentItem>, StoreError> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    fn query(&self, query: &ContentQuery) -> Result<Vec<ContentItem>, StoreError> {
        let state = self.read()?;
        Ok(state
            .items
            .values()
            .filter(|item| item.kind == query.kind && item.status == query.status)
            .filter(|item| {
                state
                    .meta
                    .get(&item.id)
                    .and_then(|meta| meta.get(&query.meta_key))
                    .is_some_and(|value| *value == query.meta_value)
            })
            .cloned()
            .collect())
    }

    fn insert(&self, item: NewContentItem) -> Result<ContentItem, StoreError> {
        let mut state = self.write()?;
        state.next_id += 1;
        let stored = ContentItem {
            id: RecordId(state.next_id),
            kind: item.kind,
            title: item.title,
            status: item.status,
            created_at: Utc::now(),
        };
        state.items.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn update(&self, patch: ContentPatch) -> Result<ContentItem, StoreError> {
        let mut state = self.write()?;
        let item = state
            .items
            .get_mut(&patch.id)
            .ok_or(StoreError::NotFound(patch.id.0))?;
        if let Some(title) = patch.title {
            item.title = title;
        }
        if let Some(status) = patch.status {
            item.status = status;
        }
        Ok(item.clone())
    }

    fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        state.meta.remove(&id);
        Ok(state.items.remove(&id).is_some())
    }
}

impl MetaStore for MemoryContentStore {
    fn get_meta(&self, record: RecordId, key: &str) -> Result<Option<MetaValue>, StoreError> {
        Ok(self
            .read()?
            .meta
            .get(&record)
            .and_then(|meta| meta.get(key))
            .cloned())
    }

    // Listings are external records, so meta may be written for ids with no content item.
    fn set_meta(&self, record: RecordId, key: &str, value: MetaValue) -> Result<(), StoreError> {
        self.write()?
            .meta
            .entry(record)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete_meta(&self, record: RecordId, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .write()?
            .meta
            .get_mut(&record)
            .and_then(|meta| meta.remove(key))
            .is_some())
    }
}

#[derive(Default)]
struct NoteState {
    next_id: u64,
    notes: BTreeMap<NoteId, NoteRecord>,
    meta: HashMap<NoteId, HashMap<String, MetaValue>>,
}

impl NoteState {
    fn matching<'a>(
        &'a self,
        key: &'a str,
        value: &'a MetaValue,
    ) -> impl Iterator<Item = &'a NoteRecord> + 'a {
        // BTreeMap iterates ids ascending; ids grow with insertion, so reversing yields newest first.
        self.notes.values().rev().filter(move |note| {
            self.meta
                .get(&note.id)
                .and_then(|meta| meta.get(key))
                .is_some_and(|stored| stored == value)
        })
    }
}

/// In-memory note records ordered newest first.
#[derive(Clone, Default)]
pub struct MemoryNoteStore {
    state: Arc<RwLock<NoteState>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, NoteState>, StoreError> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, NoteState>, StoreError> {
        self.state.write().map_err(|_| poisoned())
    }

    /// Total records regardless of owner.
    pub fn len(&self) -> usize {
        self.read().map(|state| state.notes.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NoteStore for MemoryNoteStore {
    fn insert(&self, note: NewNoteRecord) -> Result<NoteRecord, StoreError> {
        let mut state = self.write()?;
        state.next_id += 1;
        let stored = NoteRecord {
            id: NoteId(state.next_id),
            parent: note.parent,
            author_name: note.author_name,
            author_email: note.author_email,
            content: note.content,
            note_type: note.note_type,
            agent: note.agent,
            created_at: Utc::now(),
        };
        state.notes.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn fetch(&self, id: NoteId) -> Result<Option<NoteRecord>, StoreError> {
        Ok(self.read()?.notes.get(&id).cloned())
    }

    fn query(
        &self,
        key: &str,
        value: &MetaValue,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<NoteRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .matching(key, value)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self, key: &str, value: &MetaValue) -> Result<usize, StoreError> {
        Ok(self.read()?.matching(key, value).count())
    }

    fn get_meta(&self, id: NoteId, key: &str) -> Result<Option<MetaValue>, StoreError> {
        Ok(self
            .read()?
            .meta
            .get(&id)
            .and_then(|meta| meta.get(key))
            .cloned())
    }

    fn set_meta(&self, id: NoteId, key: &str, value: MetaValue) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.notes.contains_key(&id) {
            return Err(StoreError::NotFound(id.0));
        }
        state
            .meta
            .entry(id)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, id: NoteId) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        state.meta.remove(&id);
        Ok(state.notes.remove(&id).is_some())
    }

    fn delete_by_meta(&self, key: &str, value: &MetaValue) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        let doomed: Vec<NoteId> = state.matching(key, value).map(|note| note.id).collect();
        for id in &doomed {
            state.notes.remove(id);
            state.meta.remove(id);
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::domain::NoteType;
    use crate::contacts::store::ContentStatus;
    use serde_json::json;

    fn new_item(title: &str) -> NewContentItem {
        NewContentItem {
            kind: "contact".to_string(),
            title: title.to_string(),
            status: ContentStatus::Published,
        }
    }

    fn new_note(content: &str) -> NewNoteRecord {
        NewNoteRecord {
            parent: None,
            author_name: "Agent".to_string(),
            author_email: "agent@example.com".to_string(),
            content: content.to_string(),
            note_type: NoteType::default(),
            agent: "test".to_string(),
        }
    }

    #[test]
    fn query_matches_kind_status_and_meta() {
        let store = MemoryContentStore::new();
        let first = store.insert(new_item("First")).expect("insert");
        let second = store.insert(new_item("Second")).expect("insert");
        store
            .set_meta(first.id, "contact_email", json!("a@example.com"))
            .expect("meta");
        store
            .set_meta(second.id, "contact_email", json!("b@example.com"))
            .expect("meta");

        let hits = store
            .query(&ContentQuery {
                kind: "contact".to_string(),
                status: ContentStatus::Published,
                meta_key: "contact_email".to_string(),
                meta_value: json!("b@example.com"),
            })
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Second");
    }

    #[test]
    fn delete_cascades_to_meta() {
        let store = MemoryContentStore::new();
        let item = store.insert(new_item("Gone")).expect("insert");
        store.set_meta(item.id, "k", json!(1)).expect("meta");

        assert!(store.delete(item.id).expect("delete"));
        assert_eq!(store.get_meta(item.id, "k").expect("read"), None);
        assert!(!store.delete(item.id).expect("second delete"));
    }

    #[test]
    fn update_of_missing_item_is_not_found() {
        let store = MemoryContentStore::new();
        let patch = ContentPatch {
            id: RecordId(99),
            title: Some("x".to_string()),
            status: None,
        };
        assert_eq!(store.update(patch), Err(StoreError::NotFound(99)));
    }

    #[test]
    fn notes_are_listed_newest_first_and_counted_per_owner() {
        let store = MemoryNoteStore::new();
        for (content, owner) in [("one", 1), ("two", 2), ("three", 1)] {
            let note = store.insert(new_note(content)).expect("insert");
            store
                .set_meta(note.id, "contact_id", json!(owner))
                .expect("meta");
        }

        let owned = store.query("contact_id", &json!(1), 0, 10).expect("query");
        let contents: Vec<&str> = owned.iter().map(|note| note.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "one"]);
        assert_eq!(store.count("contact_id", &json!(2)).expect("count"), 1);

        assert_eq!(store.delete_by_meta("contact_id", &json!(1)).expect("purge"), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn note_meta_requires_existing_note() {
        let store = MemoryNoteStore::new();
        assert_eq!(
            store.set_meta(NoteId(5), "contact_id", json!(1)),
            Err(StoreError::NotFound(5))
        );
    }
}
