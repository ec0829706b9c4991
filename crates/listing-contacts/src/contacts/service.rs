use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::domain::{
    Contact, ContactFields, ContactId, ContactIdentifier, ContactProperty, ContactUpdate,
    ContactValue, EmailAddress, ListingId, Note, NotePage, NoteType, RecordId, UpsertOutcome,
    ValidationError,
};
use super::events::{ContactEvent, ContactObserver, ObserverRegistry};
use super::index::ListingIndex;
use super::store::{
    ContentItem, ContentPatch, ContentQuery, ContentStatus, MetaValue, NewContentItem,
    NewNoteRecord, NoteRecord, NoteStore, RecordStore, StoreError, CONTACT_EMAIL_KEY,
    CONTACT_KIND, NOTE_CONTACT_KEY, RESERVED_META_KEYS,
};

/// Agent tag stamped on every note this service writes.
pub const NOTE_AGENT: &str = "listing-contacts";

/// What to do when more than one published contact carries the same email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateEmailPolicy {
    /// Fail the lookup with [`ConflictError::AmbiguousEmail`].
    #[default]
    Reject,
    /// Use the oldest matching record.
    Oldest,
}

#[derive(Debug, Clone)]
pub struct ContactSettings {
    pub notes_page_size: usize,
    pub duplicate_emails: DuplicateEmailPolicy,
}

impl Default for ContactSettings {
    fn default() -> Self {
        Self {
            notes_page_size: 20,
            duplicate_emails: DuplicateEmailPolicy::Reject,
        }
    }
}

/// Contact CRUD, listing interest, and notes over pluggable stores.
pub struct ContactService<S, N, L> {
    records: Arc<S>,
    notes: Arc<N>,
    listings: Arc<L>,
    observers: ObserverRegistry,
    settings: ContactSettings,
    // Serializes the email lookup-then-write paths so two creates cannot both pass the check.
    identity_writes: Mutex<()>,
}

impl<S, N, L> ContactService<S, N, L>
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    pub fn new(
        records: Arc<S>,
        notes: Arc<N>,
        listings: Arc<L>,
        settings: ContactSettings,
    ) -> Self {
        Self {
            records,
            notes,
            listings,
            observers: ObserverRegistry::default(),
            settings,
            identity_writes: Mutex::new(()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ContactObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    pub fn settings(&self) -> &ContactSettings {
        &self.settings
    }

    /// Loads a contact by id or email.
    pub fn resolve(&self, identifier: &ContactIdentifier) -> Result<Contact, ContactError> {
        let item = match identifier {
            ContactIdentifier::Id(id) => self.contact_item(*id)?,
            ContactIdentifier::Email(email) => self
                .find_by_email(email)?
                .ok_or_else(|| ContactError::NotFound(identifier.to_string()))?,
        };
        self.hydrate(item)
    }

    /// Parses `raw` as an id or email and loads the contact.
    pub fn lookup(&self, raw: &str) -> Result<Contact, ContactError> {
        let identifier = ContactIdentifier::parse(raw)?;
        self.resolve(&identifier)
    }

    pub fn get(&self, id: ContactId) -> Result<Contact, ContactError> {
        self.resolve(&ContactIdentifier::Id(id))
    }

    /// Creates a new contact. An existing contact with the same email is a conflict.
    pub fn create(&self, fields: ContactFields) -> Result<Contact, ContactError> {
        let email = EmailAddress::parse(&fields.email)?;
        let name = fields.name.trim().to_string();

        let _guard = self.identity_lock()?;
        self.observers.emit(ContactEvent::PreCreate {
            name: name.clone(),
            email: email.to_string(),
        });

        if let Some(existing) = self.find_by_email(&email)? {
            return Err(ConflictError::EmailTaken {
                email: email.to_string(),
                owner: ContactId(existing.id.0),
            }
            .into());
        }

        self.insert_contact(name, email)
    }

    /// Creates the contact, or renames the one that already owns the email.
    pub fn upsert_by_email(&self, fields: ContactFields) -> Result<UpsertOutcome, ContactError> {
        let email = EmailAddress::parse(&fields.email)?;
        let name = fields.name.trim().to_string();

        let _guard = self.identity_lock()?;
        match self.find_by_email(&email)? {
            Some(existing) => {
                let contact_id = ContactId(existing.id.0);
                self.observers.emit(ContactEvent::PreUpdate { contact_id });
                let item = self.records.update(ContentPatch {
                    id: existing.id,
                    title: Some(name),
                    status: None,
                })?;
                let contact = self.hydrate(item)?;
                info!(contact_id = %contact.id, "existing contact updated by email");
                self.observers.emit(ContactEvent::PostUpdate {
                    contact_id,
                    email_changed: false,
                });
                Ok(UpsertOutcome::Updated(contact))
            }
            None => {
                self.observers.emit(ContactEvent::PreCreate {
                    name: name.clone(),
                    email: email.to_string(),
                });
                self.insert_contact(name, email).map(UpsertOutcome::Created)
            }
        }
    }

    /// Applies a partial update. Omitted fields keep their stored values.
    pub fn update(&self, id: ContactId, changes: ContactUpdate) -> Result<Contact, ContactError> {
        if changes.is_empty() {
            return Err(ValidationError::EmptyUpdate.into());
        }
        let new_email = changes
            .email
            .as_deref()
            .map(EmailAddress::parse)
            .transpose()?;

        let _guard = self.identity_lock()?;
        let current = self.get(id)?;

        let email_change = match new_email {
            Some(email) if email != current.email => {
                if let Some(owner) = self.find_by_email(&email)? {
                    if owner.id != RecordId::from(id) {
                        return Err(ConflictError::EmailTaken {
                            email: email.to_string(),
                            owner: ContactId(owner.id.0),
                        }
                        .into());
                    }
                }
                Some(email)
            }
            _ => None,
        };

        self.observers.emit(ContactEvent::PreUpdate { contact_id: id });

        if let Some(name) = changes.name {
            self.records.update(ContentPatch {
                id: id.into(),
                title: Some(name.trim().to_string()),
                status: None,
            })?;
        }
        let email_changed = email_change.is_some();
        if let Some(email) = email_change {
            self.records
                .set_meta(id.into(), CONTACT_EMAIL_KEY, Value::from(email.as_str()))?;
        }

        let contact = self.get(id)?;
        debug!(contact_id = %id, email_changed, "contact updated");
        self.observers.emit(ContactEvent::PostUpdate {
            contact_id: id,
            email_changed,
        });
        Ok(contact)
    }

    /// Records interest in a listing. Returns false if the contact was already attached.
    pub fn attach_listing(&self, id: ContactId, listing: ListingId) -> Result<bool, ContactError> {
        let listing = ListingId::new(listing.0)?;
        self.contact_item(id)?;

        self.observers.emit(ContactEvent::PreAttachListing {
            contact_id: id,
            listing_id: listing,
        });
        let added = self.listings.link(id, listing)?;
        self.observers.emit(ContactEvent::PostAttachListing {
            contact_id: id,
            listing_id: listing,
            added,
        });
        Ok(added)
    }

    /// Drops interest in a listing. Returns false if the contact was not attached.
    pub fn remove_listing(&self, id: ContactId, listing: ListingId) -> Result<bool, ContactError> {
        let listing = ListingId::new(listing.0)?;
        self.contact_item(id)?;

        self.observers.emit(ContactEvent::PreRemoveListing {
            contact_id: id,
            listing_id: listing,
        });
        let removed = self.listings.unlink(id, listing)?;
        self.observers.emit(ContactEvent::PostRemoveListing {
            contact_id: id,
            listing_id: listing,
            removed,
        });
        Ok(removed)
    }

    pub fn listings(&self, id: ContactId) -> Result<Vec<ListingId>, ContactError> {
        self.contact_item(id)?;
        Ok(self.listings.listings_for(id)?)
    }

    pub fn listing_count(&self, id: ContactId) -> Result<usize, ContactError> {
        self.listings(id).map(|listings| listings.len())
    }

    /// Contacts interested in `listing`. Listings are external, so an unknown id is just empty.
    pub fn contacts_for_listing(&self, listing: ListingId) -> Result<Vec<ContactId>, ContactError> {
        let listing = ListingId::new(listing.0)?;
        Ok(self.listings.contacts_for(listing)?)
    }

    /// Stores a note authored by the contact, optionally about one listing.
    pub fn add_note(
        &self,
        id: ContactId,
        text: &str,
        note_type: NoteType,
        listing: Option<ListingId>,
    ) -> Result<Note, ContactError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyNote.into());
        }
        let listing = listing.map(|listing| ListingId::new(listing.0)).transpose()?;
        let contact = self.get(id)?;

        let content = self
            .observers
            .filter_note(trimmed.to_string(), &note_type, listing);
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyNote.into());
        }

        self.observers.emit(ContactEvent::PreAddNote {
            contact_id: id,
            note_type: note_type.clone(),
        });

        let record = self.notes.insert(NewNoteRecord {
            parent: listing.map(RecordId::from),
            author_name: contact.name.clone(),
            author_email: contact.email.to_string(),
            content,
            note_type,
            agent: NOTE_AGENT.to_string(),
        })?;

        if let Err(err) = self
            .notes
            .set_meta(record.id, NOTE_CONTACT_KEY, Value::from(id.0))
        {
            warn!(contact_id = %id, note_id = %record.id, error = %err, "note back-reference failed, discarding note");
            self.notes.delete(record.id)?;
            return Err(err.into());
        }

        self.observers.emit(ContactEvent::PostAddNote {
            contact_id: id,
            note_id: record.id,
            listing_id: listing,
        });
        Ok(note_from_record(id, record))
    }

    pub fn notes(&self, id: ContactId, page: NotePage) -> Result<Vec<Note>, ContactError> {
        self.contact_item(id)?;
        let records = self.notes.query(
            NOTE_CONTACT_KEY,
            &Value::from(id.0),
            page.offset(),
            page.per_page,
        )?;
        Ok(records
            .into_iter()
            .map(|record| note_from_record(id, record))
            .collect())
    }

    /// First page using the configured page size.
    pub fn recent_notes(&self, id: ContactId) -> Result<Vec<Note>, ContactError> {
        let page = NotePage::first(self.settings.notes_page_size)?;
        self.notes(id, page)
    }

    pub fn notes_count(&self, id: ContactId) -> Result<usize, ContactError> {
        self.contact_item(id)?;
        Ok(self.notes.count(NOTE_CONTACT_KEY, &Value::from(id.0))?)
    }

    /// Removes the contact, its notes, and its listing back-references.
    pub fn delete(&self, id: ContactId) -> Result<(), ContactError> {
        self.contact_item(id)?;
        self.observers.emit(ContactEvent::PreDelete { contact_id: id });

        let released_listings = self.listings.purge_contact(id)?;
        let removed_notes = self
            .notes
            .delete_by_meta(NOTE_CONTACT_KEY, &Value::from(id.0))?;
        self.records.delete(id.into())?;

        info!(
            contact_id = %id,
            listings = released_listings.len(),
            notes = removed_notes,
            "contact deleted"
        );
        self.observers.emit(ContactEvent::PostDelete {
            contact_id: id,
            released_listings,
        });
        Ok(())
    }

    pub fn meta(&self, id: ContactId, key: &str) -> Result<Option<MetaValue>, ContactError> {
        self.contact_item(id)?;
        Ok(self.records.get_meta(id.into(), key)?)
    }

    /// Writes free-form meta. Keys owned by the service are refused.
    pub fn update_meta(
        &self,
        id: ContactId,
        key: &str,
        value: MetaValue,
    ) -> Result<(), ContactError> {
        if RESERVED_META_KEYS.contains(&key) {
            return Err(ValidationError::ReservedMetaKey(key.to_string()).into());
        }
        self.contact_item(id)?;
        Ok(self.records.set_meta(id.into(), key, value)?)
    }

    pub fn property(
        &self,
        id: ContactId,
        property: ContactProperty,
    ) -> Result<ContactValue, ContactError> {
        let contact = self.get(id)?;
        if let Some(value) = contact.property(property) {
            return Ok(value);
        }
        match property {
            ContactProperty::NotesCount => self.notes_count(id).map(ContactValue::Count),
            _ => self.recent_notes(id).map(ContactValue::Notes),
        }
    }

    fn identity_lock(&self) -> Result<MutexGuard<'_, ()>, ContactError> {
        self.identity_writes
            .lock()
            .map_err(|_| StoreError::Unavailable("identity lock poisoned".to_string()).into())
    }

    fn insert_contact(&self, name: String, email: EmailAddress) -> Result<Contact, ContactError> {
        let item = self.records.insert(NewContentItem {
            kind: CONTACT_KIND.to_string(),
            title: name,
            status: ContentStatus::Published,
        })?;

        if let Err(err) = self
            .records
            .set_meta(item.id, CONTACT_EMAIL_KEY, Value::from(email.as_str()))
        {
            warn!(record_id = %item.id, error = %err, "email write failed, discarding new contact");
            self.records.delete(item.id)?;
            return Err(err.into());
        }

        let contact = self.hydrate(item)?;
        info!(contact_id = %contact.id, "contact created");
        self.observers.emit(ContactEvent::PostCreate {
            contact_id: contact.id,
            email: contact.email.to_string(),
        });
        Ok(contact)
    }

    /// Fetches the backing item, insisting it is a published contact.
    fn contact_item(&self, id: ContactId) -> Result<ContentItem, ContactError> {
        if id.0 == 0 {
            return Err(ValidationError::InvalidContactId(id.to_string()).into());
        }
        match self.records.fetch(id.into())? {
            Some(item) if is_contact(&item) => Ok(item),
            _ => Err(ContactError::NotFound(ContactIdentifier::Id(id).to_string())),
        }
    }

    fn find_by_email(&self, email: &EmailAddress) -> Result<Option<ContentItem>, ContactError> {
        let mut matches = self.records.query(&ContentQuery {
            kind: CONTACT_KIND.to_string(),
            status: ContentStatus::Published,
            meta_key: CONTACT_EMAIL_KEY.to_string(),
            meta_value: Value::from(email.as_str()),
        })?;

        if matches.len() > 1 {
            match self.settings.duplicate_emails {
                DuplicateEmailPolicy::Reject => {
                    return Err(ConflictError::AmbiguousEmail {
                        email: email.to_string(),
                        matches: matches.iter().map(|item| ContactId(item.id.0)).collect(),
                    }
                    .into());
                }
                DuplicateEmailPolicy::Oldest => {
                    warn!(%email, matches = matches.len(), "duplicate contact emails, using oldest");
                    matches.sort_by_key(|item| (item.created_at, item.id));
                }
            }
        }
        Ok(matches.into_iter().next())
    }

    fn hydrate(&self, item: ContentItem) -> Result<Contact, ContactError> {
        let id = ContactId(item.id.0);
        let email = self
            .records
            .get_meta(item.id, CONTACT_EMAIL_KEY)?
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|raw| EmailAddress::parse(raw).ok())
            .ok_or(ContactError::Incomplete(id))?;
        let listing_ids = self.listings.listings_for(id)?;

        Ok(Contact {
            id,
            name: item.title,
            email,
            date_created: item.created_at,
            listing_count: listing_ids.len(),
            listing_ids,
        })
    }
}

fn is_contact(item: &ContentItem) -> bool {
    item.kind == CONTACT_KIND && item.status == ContentStatus::Published
}

fn note_from_record(contact_id: ContactId, record: NoteRecord) -> Note {
    Note {
        id: record.id,
        contact_id,
        listing_id: record.parent.map(|parent| ListingId(parent.0)),
        author_name: record.author_name,
        author_email: record.author_email,
        content: record.content,
        note_type: record.note_type,
        created_at: record.created_at,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("email {email} already belongs to contact {owner}")]
    EmailTaken { email: String, owner: ContactId },
    #[error("email {email} matches {} contacts", .matches.len())]
    AmbiguousEmail {
        email: String,
        matches: Vec<ContactId>,
    },
}

/// Error raised by the contact service.
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("contact {0} has no email on record")]
    Incomplete(ContactId),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Storage(#[from] StoreError),
}
