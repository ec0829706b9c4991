use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use super::domain::{ContactId, ListingId, NoteId, NoteType};

/// Lifecycle notifications emitted around every contact mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContactEvent {
    PreCreate {
        name: String,
        email: String,
    },
    PostCreate {
        contact_id: ContactId,
        email: String,
    },
    PreUpdate {
        contact_id: ContactId,
    },
    PostUpdate {
        contact_id: ContactId,
        email_changed: bool,
    },
    PreAttachListing {
        contact_id: ContactId,
        listing_id: ListingId,
    },
    PostAttachListing {
        contact_id: ContactId,
        listing_id: ListingId,
        added: bool,
    },
    PreRemoveListing {
        contact_id: ContactId,
        listing_id: ListingId,
    },
    PostRemoveListing {
        contact_id: ContactId,
        listing_id: ListingId,
        removed: bool,
    },
    PreAddNote {
        contact_id: ContactId,
        note_type: NoteType,
    },
    PostAddNote {
        contact_id: ContactId,
        note_id: NoteId,
        listing_id: Option<ListingId>,
    },
    PreDelete {
        contact_id: ContactId,
    },
    PostDelete {
        contact_id: ContactId,
        released_listings: Vec<ListingId>,
    },
}

impl ContactEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            ContactEvent::PreCreate { .. } => "pre_create",
            ContactEvent::PostCreate { .. } => "post_create",
            ContactEvent::PreUpdate { .. } => "pre_update",
            ContactEvent::PostUpdate { .. } => "post_update",
            ContactEvent::PreAttachListing { .. } => "pre_attach_listing",
            ContactEvent::PostAttachListing { .. } => "post_attach_listing",
            ContactEvent::PreRemoveListing { .. } => "pre_remove_listing",
            ContactEvent::PostRemoveListing { .. } => "post_remove_listing",
            ContactEvent::PreAddNote { .. } => "pre_add_note",
            ContactEvent::PostAddNote { .. } => "post_add_note",
            ContactEvent::PreDelete { .. } => "pre_delete",
            ContactEvent::PostDelete { .. } => "post_delete",
        }
    }
}

/// External hook into the contact lifecycle. Both methods have no-op defaults.
pub trait ContactObserver: Send + Sync {
    /// Fire-and-forget; nothing an observer does can fail the operation.
    fn notify(&self, _event: &ContactEvent) {}

    /// Rewrites note text before it is stored.
    fn filter_note(
        &self,
        note: String,
        _note_type: &NoteType,
        _listing: Option<ListingId>,
    ) -> String {
        note
    }
}

/// Ordered set of observers the service dispatches to.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn ContactObserver>>,
}

impl ObserverRegistry {
    pub fn register(&mut self, observer: Arc<dyn ContactObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn emit(&self, event: ContactEvent) {
        for observer in &self.observers {
            observer.notify(&event);
        }
    }

    /// Threads the note through every observer's filter in registration order.
    pub fn filter_note(
        &self,
        note: String,
        note_type: &NoteType,
        listing: Option<ListingId>,
    ) -> String {
        self.observers
            .iter()
            .fold(note, |text, observer| {
                observer.filter_note(text, note_type, listing)
            })
    }
}

/// Logs each lifecycle event at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ContactObserver for TracingObserver {
    fn notify(&self, event: &ContactEvent) {
        debug!(event = event.name(), details = ?event, "contact lifecycle");
    }
}

/// Keeps every event in memory; handy for tests and the CLI demo.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ContactEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ContactEvent> {
        self.events.lock().expect("observer mutex poisoned").clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(ContactEvent::name).collect()
    }
}

impl ContactObserver for RecordingObserver {
    fn notify(&self, event: &ContactEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
