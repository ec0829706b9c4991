use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of any item in the content store.
    RecordId
);
record_id!(
    /// Content-item id of a contact.
    ContactId
);
record_id!(
    /// Id of an external listing; listings live outside this crate.
    ListingId
);
record_id!(NoteId);

impl From<ContactId> for RecordId {
    fn from(value: ContactId) -> Self {
        RecordId(value.0)
    }
}

impl From<ListingId> for RecordId {
    fn from(value: ListingId) -> Self {
        RecordId(value.0)
    }
}

impl ListingId {
    pub fn new(raw: u64) -> Result<Self, ValidationError> {
        if raw == 0 {
            return Err(ValidationError::InvalidListingId(raw.to_string()));
        }
        Ok(Self(raw))
    }
}

/// Normalized (trimmed, lower-cased) email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let candidate = raw.trim();
        if is_valid_email(candidate) {
            Ok(Self(candidate.to_ascii_lowercase()))
        } else {
            Err(ValidationError::InvalidEmail(candidate.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const LOCAL_PART_SYMBOLS: &str = "!#$%&'*+/=?^_`{|}~.-";

fn is_valid_email(candidate: &str) -> bool {
    if candidate.len() < 6 {
        return false;
    }

    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || LOCAL_PART_SYMBOLS.contains(c))
    {
        return false;
    }

    if domain.contains("..") || domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// How a caller names a contact: by record id or by email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactIdentifier {
    Id(ContactId),
    Email(EmailAddress),
}

impl ContactIdentifier {
    /// Anything that looks numeric is treated as an id and must be a positive integer.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let numeric = !trimmed.is_empty()
            && trimmed
                .trim_start_matches(['-', '+'])
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.');

        if numeric {
            return match trimmed.parse::<u64>() {
                Ok(id) if id > 0 => Ok(Self::Id(ContactId(id))),
                _ => Err(ValidationError::InvalidContactId(trimmed.to_string())),
            };
        }

        EmailAddress::parse(trimmed).map(Self::Email)
    }
}

impl fmt::Display for ContactIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactIdentifier::Id(id) => write!(f, "contact #{id}"),
            ContactIdentifier::Email(email) => write!(f, "contact <{email}>"),
        }
    }
}

/// A hydrated contact. Notes are loaded through the service on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub email: EmailAddress,
    pub date_created: DateTime<Utc>,
    pub listing_ids: Vec<ListingId>,
    pub listing_count: usize,
}

impl Contact {
    /// Static counterpart of the property lookups that only need entity state.
    /// Returns `None` for properties that must be read from the note store.
    pub fn property(&self, property: ContactProperty) -> Option<ContactValue> {
        let value = match property {
            ContactProperty::Id => ContactValue::Id(self.id.0),
            ContactProperty::Name => ContactValue::Text(self.name.clone()),
            ContactProperty::Email => ContactValue::Text(self.email.to_string()),
            ContactProperty::DateCreated => ContactValue::Timestamp(self.date_created),
            ContactProperty::ListingIds => ContactValue::Listings(self.listing_ids.clone()),
            ContactProperty::ListingCount => ContactValue::Count(self.listing_count),
            ContactProperty::Notes | ContactProperty::NotesCount => return None,
        };
        Some(value)
    }
}

/// Input for create and upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFields {
    #[serde(default)]
    pub name: String,
    pub email: String,
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl ContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

/// Which branch an upsert took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Contact),
    Updated(Contact),
}

impl UpsertOutcome {
    pub fn contact(&self) -> &Contact {
        match self {
            UpsertOutcome::Created(contact) | UpsertOutcome::Updated(contact) => contact,
        }
    }

    pub fn into_contact(self) -> Contact {
        match self {
            UpsertOutcome::Created(contact) | UpsertOutcome::Updated(contact) => contact,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            UpsertOutcome::Created(_) => "created",
            UpsertOutcome::Updated(_) => "updated",
        }
    }
}

/// Free-form note category. Plugins add their own; `user_note` is the default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteType(String);

impl NoteType {
    pub const USER_NOTE: &'static str = "user_note";

    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::default()
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NoteType {
    fn default() -> Self {
        Self(Self::USER_NOTE.to_string())
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A note attached to a contact, optionally about one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub contact_id: ContactId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<ListingId>,
    pub author_name: String,
    pub author_email: String,
    pub content: String,
    pub note_type: NoteType,
    pub created_at: DateTime<Utc>,
}

/// 1-based page request for notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotePage {
    pub per_page: usize,
    pub page: usize,
}

impl NotePage {
    /// Rejects empty pages and pages whose offset would not fit in `usize`.
    pub fn new(per_page: usize, page: usize) -> Result<Self, ValidationError> {
        let addressable = page
            .checked_sub(1)
            .and_then(|skipped| skipped.checked_mul(per_page))
            .is_some();
        if per_page == 0 || !addressable {
            return Err(ValidationError::InvalidPage { per_page, page });
        }
        Ok(Self { per_page, page })
    }

    pub fn first(per_page: usize) -> Result<Self, ValidationError> {
        Self::new(per_page, 1)
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// Named contact properties, replacing string-built accessor lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactProperty {
    Id,
    Name,
    Email,
    DateCreated,
    ListingIds,
    ListingCount,
    Notes,
    NotesCount,
}

impl ContactProperty {
    pub const fn name(self) -> &'static str {
        match self {
            ContactProperty::Id => "id",
            ContactProperty::Name => "name",
            ContactProperty::Email => "email",
            ContactProperty::DateCreated => "date_created",
            ContactProperty::ListingIds => "listing_ids",
            ContactProperty::ListingCount => "listing_count",
            ContactProperty::Notes => "notes",
            ContactProperty::NotesCount => "notes_count",
        }
    }
}

impl FromStr for ContactProperty {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            "email" => Ok(Self::Email),
            "date_created" => Ok(Self::DateCreated),
            "listing_ids" | "listings" => Ok(Self::ListingIds),
            "listing_count" => Ok(Self::ListingCount),
            "notes" => Ok(Self::Notes),
            "notes_count" => Ok(Self::NotesCount),
            _ => Err(ValidationError::UnknownProperty(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ContactValue {
    Id(u64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Listings(Vec<ListingId>),
    Count(usize),
    Notes(Vec<Note>),
}

/// Input rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("'{0}' is not a positive contact id")]
    InvalidContactId(String),
    #[error("'{0}' is not a positive listing id")]
    InvalidListingId(String),
    #[error("update must set at least one field")]
    EmptyUpdate,
    #[error("note text is empty")]
    EmptyNote,
    #[error("page {page} with {per_page} per page is not a valid page request")]
    InvalidPage { per_page: usize, page: usize },
    #[error("meta key '{0}' is managed by the contact service")]
    ReservedMetaKey(String),
    #[error("contact has no property '{0}'")]
    UnknownProperty(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_parse_normalizes_case_and_whitespace() {
        let email = EmailAddress::parse("  Jane.Doe@Example.COM ").expect("valid email");
        assert_eq!(email.as_str(), "jane.doe@example.com");
    }

    #[test]
    fn email_parse_rejects_malformed_addresses() {
        for raw in [
            "",
            "a@b.c",
            "no-at-sign.example.com",
            "two@@example.com",
            "user@example",
            "user@.example.com",
            "user@example..com",
            "user@-example.com",
            "us er@example.com",
            "@example.com",
        ] {
            assert!(
                matches!(EmailAddress::parse(raw), Err(ValidationError::InvalidEmail(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn identifier_distinguishes_ids_from_emails() {
        assert_eq!(
            ContactIdentifier::parse("42").expect("id"),
            ContactIdentifier::Id(ContactId(42))
        );
        assert!(matches!(
            ContactIdentifier::parse("buyer@example.com").expect("email"),
            ContactIdentifier::Email(_)
        ));
    }

    #[test]
    fn identifier_rejects_non_positive_and_fractional_ids() {
        for raw in ["0", "-3", "4.5", "+-1"] {
            assert!(
                matches!(
                    ContactIdentifier::parse(raw),
                    Err(ValidationError::InvalidContactId(_))
                ),
                "{raw:?} should be rejected"
            );
        }
        assert!(matches!(
            ContactIdentifier::parse("not-an-email"),
            Err(ValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn note_page_offsets_are_zero_based() {
        assert_eq!(NotePage::new(20, 1).expect("page").offset(), 0);
        assert_eq!(NotePage::new(10, 2).expect("page").offset(), 10);
        assert!(NotePage::new(0, 1).is_err());
        assert!(NotePage::new(10, 0).is_err());
    }

    #[test]
    fn note_pages_past_the_addressable_range_are_invalid() {
        assert_eq!(
            NotePage::new(2, usize::MAX),
            Err(ValidationError::InvalidPage {
                per_page: 2,
                page: usize::MAX,
            })
        );
        assert!(NotePage::new(1, usize::MAX).is_ok());
        let unchecked = NotePage {
            per_page: 2,
            page: usize::MAX,
        };
        assert_eq!(unchecked.offset(), usize::MAX);
    }

    #[test]
    fn property_names_round_trip_through_parse() {
        for property in [
            ContactProperty::Id,
            ContactProperty::Name,
            ContactProperty::Email,
            ContactProperty::DateCreated,
            ContactProperty::ListingIds,
            ContactProperty::ListingCount,
            ContactProperty::Notes,
            ContactProperty::NotesCount,
        ] {
            assert_eq!(property.name().parse::<ContactProperty>(), Ok(property));
        }
        assert_eq!(
            "phone".parse::<ContactProperty>(),
            Err(ValidationError::UnknownProperty("phone".to_string()))
        );
    }

    #[test]
    fn blank_note_type_falls_back_to_user_note() {
        assert_eq!(NoteType::new("  ").as_str(), NoteType::USER_NOTE);
        assert_eq!(NoteType::new("call_log").as_str(), "call_log");
    }
}
