//! Storage seams consumed by the contact service.
//!
//! The service never assumes a particular backend. Content items, their scalar meta, and the
//! note records are three separate collaborators so a host system can map each onto whatever
//! tables it already has.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{NoteId, NoteType, RecordId};

/// Schema-less meta value. Callers validate before writing.
pub type MetaValue = Value;

pub const CONTACT_KIND: &str = "contact";
pub const CONTACT_EMAIL_KEY: &str = "contact_email";
pub const CONTACT_LISTINGS_KEY: &str = "contact_listings";
pub const LISTING_CONTACTS_KEY: &str = "listing_contacts";
pub const NOTE_CONTACT_KEY: &str = "contact_id";

/// Meta keys only the contact service may write.
pub const RESERVED_META_KEYS: [&str; 3] =
    [CONTACT_EMAIL_KEY, CONTACT_LISTINGS_KEY, LISTING_CONTACTS_KEY];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Published,
    Trashed,
}

/// Generic stored record carrying a contact's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: RecordId,
    pub kind: String,
    pub title: String,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContentItem {
    pub kind: String,
    pub title: String,
    pub status: ContentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPatch {
    pub id: RecordId,
    pub title: Option<String>,
    pub status: Option<ContentStatus>,
}

/// Filter for [`ContentStore::query`]. Results are ordered oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentQuery {
    pub kind: String,
    pub status: ContentStatus,
    pub meta_key: String,
    pub meta_value: MetaValue,
}

pub trait ContentStore: Send + Sync {
    fn fetch(&self, id: RecordId) -> Result<Option<ContentItem>, StoreError>;
    fn query(&self, query: &ContentQuery) -> Result<Vec<ContentItem>, StoreError>;
    fn insert(&self, item: NewContentItem) -> Result<ContentItem, StoreError>;
    fn update(&self, patch: ContentPatch) -> Result<ContentItem, StoreError>;
    /// Removes the item and every meta value attached to it. Returns false if it was absent.
    fn delete(&self, id: RecordId) -> Result<bool, StoreError>;
}

pub trait MetaStore: Send + Sync {
    fn get_meta(&self, record: RecordId, key: &str) -> Result<Option<MetaValue>, StoreError>;
    fn set_meta(&self, record: RecordId, key: &str, value: MetaValue) -> Result<(), StoreError>;
    fn delete_meta(&self, record: RecordId, key: &str) -> Result<bool, StoreError>;
}

/// Content items and their meta usually live in the same backend.
pub trait RecordStore: ContentStore + MetaStore {}

impl<T: ContentStore + MetaStore> RecordStore for T {}

/// Comment-like annotation record backing a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: NoteId,
    /// Listing the note is about, if any.
    pub parent: Option<RecordId>,
    pub author_name: String,
    pub author_email: String,
    pub content: String,
    pub note_type: NoteType,
    pub agent: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNoteRecord {
    pub parent: Option<RecordId>,
    pub author_name: String,
    pub author_email: String,
    pub content: String,
    pub note_type: NoteType,
    pub agent: String,
}

pub trait NoteStore: Send + Sync {
    fn insert(&self, note: NewNoteRecord) -> Result<NoteRecord, StoreError>;
    fn fetch(&self, id: NoteId) -> Result<Option<NoteRecord>, StoreError>;
    /// Notes whose meta `key` equals `value`, newest first.
    fn query(
        &self,
        key: &str,
        value: &MetaValue,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<NoteRecord>, StoreError>;
    fn count(&self, key: &str, value: &MetaValue) -> Result<usize, StoreError>;
    fn get_meta(&self, id: NoteId, key: &str) -> Result<Option<MetaValue>, StoreError>;
    fn set_meta(&self, id: NoteId, key: &str, value: MetaValue) -> Result<(), StoreError>;
    fn delete(&self, id: NoteId) -> Result<bool, StoreError>;
    fn delete_by_meta(&self, key: &str, value: &MetaValue) -> Result<usize, StoreError>;
}

/// Error enumeration for storage collaborator failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(u64),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Reads an id list out of an untyped meta value.
///
/// Accepts arrays of numbers or numeric strings, a lone number, or a numeric string. Zero and
/// anything unparseable is dropped rather than failing the read.
pub fn coerce_ids(value: Option<&MetaValue>) -> Vec<u64> {
    fn one(value: &Value) -> Option<u64> {
        let id = match value {
            Value::Number(number) => number.as_u64(),
            Value::String(raw) => raw.trim().parse::<u64>().ok(),
            _ => None,
        };
        id.filter(|id| *id > 0)
    }

    match value {
        Some(Value::Array(items)) => items.iter().filter_map(one).collect(),
        Some(other) => one(other).into_iter().collect(),
        None => Vec::new(),
    }
}

pub fn ids_value<I>(ids: I) -> MetaValue
where
    I: IntoIterator<Item = u64>,
{
    Value::Array(ids.into_iter().map(Value::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_ids_accepts_loose_shapes() {
        assert_eq!(coerce_ids(Some(&json!([3, "4", 0, "x", 5]))), vec![3, 4, 5]);
        assert_eq!(coerce_ids(Some(&json!(7))), vec![7]);
        assert_eq!(coerce_ids(Some(&json!(" 8 "))), vec![8]);
        assert!(coerce_ids(Some(&json!("garbage"))).is_empty());
        assert!(coerce_ids(Some(&json!({"listing": 1}))).is_empty());
        assert!(coerce_ids(None).is_empty());
    }
}
