use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::contacts::domain::{ContactFields, NoteId, RecordId};
use crate::contacts::events::RecordingObserver;
use crate::contacts::index::{MemoryListingIndex, MetaListingIndex};
use crate::contacts::memory::{MemoryContentStore, MemoryNoteStore};
use crate::contacts::service::{ContactService, ContactSettings};
use crate::contacts::store::{
    ContentItem, ContentPatch, ContentQuery, ContentStore, MetaStore, MetaValue, NewContentItem,
    NewNoteRecord, NoteRecord, NoteStore, StoreError, CONTACT_EMAIL_KEY,
};

pub(super) type MemoryService =
    ContactService<MemoryContentStore, MemoryNoteStore, MemoryListingIndex>;

pub(super) struct Harness {
    pub(super) service: MemoryService,
    pub(super) records: Arc<MemoryContentStore>,
    pub(super) notes: Arc<MemoryNoteStore>,
    pub(super) listings: Arc<MemoryListingIndex>,
    pub(super) observer: RecordingObserver,
}

pub(super) fn harness() -> Harness {
    harness_with(ContactSettings::default())
}

pub(super) fn harness_with(settings: ContactSettings) -> Harness {
    let records = Arc::new(MemoryContentStore::new());
    let notes = Arc::new(MemoryNoteStore::new());
    let listings = Arc::new(MemoryListingIndex::new());
    let observer = RecordingObserver::default();
    let service = ContactService::new(records.clone(), notes.clone(), listings.clone(), settings)
        .with_observer(Arc::new(observer.clone()));
    Harness {
        service,
        records,
        notes,
        listings,
        observer,
    }
}

pub(super) type MetaIndexService = ContactService<
    MemoryContentStore,
    MemoryNoteStore,
    MetaListingIndex<MemoryContentStore, MemoryContentStore>,
>;

/// Service over the meta-list index; the listing side gets its own store.
pub(super) fn meta_index_service() -> MetaIndexService {
    let records = Arc::new(MemoryContentStore::new());
    let listing_meta = Arc::new(MemoryContentStore::new());
    let index = MetaListingIndex::new(records.clone(), listing_meta);
    ContactService::new(
        records,
        Arc::new(MemoryNoteStore::new()),
        Arc::new(index),
        ContactSettings::default(),
    )
}

pub(super) fn fields(name: &str, email: &str) -> ContactFields {
    ContactFields {
        name: name.to_string(),
        email: email.to_string(),
    }
}

pub(super) fn contact_count(records: &MemoryContentStore) -> usize {
    records.count_kind("contact")
}

/// Record store whose email writes fail; everything else is delegated.
#[derive(Default)]
pub(super) struct EmailWritesFail {
    pub(super) inner: MemoryContentStore,
}

impl ContentStore for EmailWritesFail {
    fn fetch(&self, id: RecordId) -> Result<Option<ContentItem>, StoreError> {
        self.inner.fetch(id)
    }

    fn query(&self, query: &ContentQuery) -> Result<Vec<ContentItem>, StoreError> {
        self.inner.query(query)
    }

    fn insert(&self, item: NewContentItem) -> Result<ContentItem, StoreError> {
        self.inner.insert(item)
    }

    fn update(&self, patch: ContentPatch) -> Result<ContentItem, StoreError> {
        self.inner.update(patch)
    }

    fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        self.inner.delete(id)
    }
}

impl MetaStore for EmailWritesFail {
    fn get_meta(&self, record: RecordId, key: &str) -> Result<Option<MetaValue>, StoreError> {
        self.inner.get_meta(record, key)
    }

    fn set_meta(&self, record: RecordId, key: &str, value: MetaValue) -> Result<(), StoreError> {
        if key == CONTACT_EMAIL_KEY {
            return Err(StoreError::Unavailable("meta table locked".to_string()));
        }
        self.inner.set_meta(record, key, value)
    }

    fn delete_meta(&self, record: RecordId, key: &str) -> Result<bool, StoreError> {
        self.inner.delete_meta(record, key)
    }
}

/// Note store that cannot write meta, so back-references never land.
#[derive(Default)]
pub(super) struct NoteMetaFails {
    pub(super) inner: MemoryNoteStore,
}

impl NoteStore for NoteMetaFails {
    fn insert(&self, note: NewNoteRecord) -> Result<NoteRecord, StoreError> {
        self.inner.insert(note)
    }

    fn fetch(&self, id: NoteId) -> Result<Option<NoteRecord>, StoreError> {
        self.inner.fetch(id)
    }

    fn query(
        &self,
        key: &str,
        value: &MetaValue,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<NoteRecord>, StoreError> {
        self.inner.query(key, value, offset, limit)
    }

    fn count(&self, key: &str, value: &MetaValue) -> Result<usize, StoreError> {
        self.inner.count(key, value)
    }

    fn get_meta(&self, id: NoteId, key: &str) -> Result<Option<MetaValue>, StoreError> {
        self.inner.get_meta(id, key)
    }

    fn set_meta(&self, _id: NoteId, _key: &str, _value: MetaValue) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("comment meta offline".to_string()))
    }

    fn delete(&self, id: NoteId) -> Result<bool, StoreError> {
        self.inner.delete(id)
    }

    fn delete_by_meta(&self, key: &str, value: &MetaValue) -> Result<usize, StoreError> {
        self.inner.delete_by_meta(key, value)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
