//! Contacts interested in listings, and the notes kept about them.
//!
//! A contact is a published content item of kind `contact` whose email lives in record meta.
//! Listing interest is held by a [`ListingIndex`]; notes are annotation records tied back to
//! the contact through a meta value.

pub mod domain;
pub mod events;
pub mod index;
pub mod memory;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    Contact, ContactFields, ContactId, ContactIdentifier, ContactProperty, ContactUpdate,
    ContactValue, EmailAddress, ListingId, Note, NoteId, NotePage, NoteType, RecordId,
    UpsertOutcome, ValidationError,
};
pub use events::{ContactEvent, ContactObserver, ObserverRegistry, RecordingObserver, TracingObserver};
pub use index::{ListingIndex, MemoryListingIndex, MetaListingIndex};
pub use memory::{MemoryContentStore, MemoryNoteStore};
pub use router::{contact_router, error_response};
pub use service::{
    ConflictError, ContactError, ContactService, ContactSettings, DuplicateEmailPolicy, NOTE_AGENT,
};
pub use store::{
    ContentItem, ContentStore, MetaStore, MetaValue, NoteRecord, NoteStore, RecordStore,
    StoreError,
};
