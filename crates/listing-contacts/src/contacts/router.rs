use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    ContactFields, ContactId, ContactIdentifier, ContactProperty, ContactUpdate, ListingId,
    NotePage, NoteType, ValidationError,
};
use super::index::ListingIndex;
use super::service::{ContactError, ContactService};
use super::store::{NoteStore, RecordStore};

type SharedService<S, N, L> = Arc<ContactService<S, N, L>>;

/// Router builder exposing contact, listing-interest, and note endpoints.
pub fn contact_router<S, N, L>(service: SharedService<S, N, L>) -> Router
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    Router::new()
        .route(
            "/api/v1/contacts",
            post(create_handler::<S, N, L>).put(upsert_handler::<S, N, L>),
        )
        .route(
            "/api/v1/contacts/:identifier",
            get(lookup_handler::<S, N, L>)
                .patch(update_handler::<S, N, L>)
                .delete(delete_handler::<S, N, L>),
        )
        .route(
            "/api/v1/contacts/:identifier/listings",
            get(listings_handler::<S, N, L>),
        )
        .route(
            "/api/v1/contacts/:identifier/listings/:listing_id",
            post(attach_handler::<S, N, L>).delete(remove_handler::<S, N, L>),
        )
        .route(
            "/api/v1/contacts/:identifier/notes",
            get(notes_handler::<S, N, L>).post(add_note_handler::<S, N, L>),
        )
        .route(
            "/api/v1/contacts/:identifier/properties/:property",
            get(property_handler::<S, N, L>),
        )
        .route(
            "/api/v1/listings/:listing_id/contacts",
            get(listing_contacts_handler::<S, N, L>),
        )
        .with_state(service)
}

/// Maps service failures onto HTTP status codes with a JSON error body.
pub fn error_response(err: ContactError) -> Response {
    let status = match &err {
        ContactError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ContactError::NotFound(_) => StatusCode::NOT_FOUND,
        ContactError::Incomplete(_) | ContactError::Conflict(_) => StatusCode::CONFLICT,
        ContactError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status == StatusCode::SERVICE_UNAVAILABLE {
        error!(error = %err, "contact storage failure");
    }
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}

fn respond<T, F>(result: Result<T, ContactError>, ok: F) -> Response
where
    F: FnOnce(T) -> Response,
{
    match result {
        Ok(value) => ok(value),
        Err(err) => error_response(err),
    }
}

/// Path segments name contacts by numeric id only; email lookups go through the GET route.
fn contact_id(raw: &str) -> Result<ContactId, ContactError> {
    match ContactIdentifier::parse(raw)? {
        ContactIdentifier::Id(id) => Ok(id),
        ContactIdentifier::Email(_) => Err(ValidationError::InvalidContactId(raw.to_string()).into()),
    }
}

pub(crate) async fn create_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Json(fields): Json<ContactFields>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    respond(service.create(fields), |contact| {
        (StatusCode::CREATED, Json(contact)).into_response()
    })
}

pub(crate) async fn upsert_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Json(fields): Json<ContactFields>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    respond(service.upsert_by_email(fields), |outcome| {
        let payload = json!({
            "outcome": outcome.label(),
            "contact": outcome.contact(),
        });
        (StatusCode::OK, Json(payload)).into_response()
    })
}

pub(crate) async fn lookup_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path(identifier): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    respond(service.lookup(&identifier), |contact| {
        (StatusCode::OK, Json(contact)).into_response()
    })
}

pub(crate) async fn update_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path(identifier): Path<String>,
    Json(changes): Json<ContactUpdate>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    let result = contact_id(&identifier).and_then(|id| service.update(id, changes));
    respond(result, |contact| (StatusCode::OK, Json(contact)).into_response())
}

pub(crate) async fn delete_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path(identifier): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    let result = contact_id(&identifier).and_then(|id| service.delete(id));
    respond(result, |()| StatusCode::NO_CONTENT.into_response())
}

pub(crate) async fn listings_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path(identifier): Path<String>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    let result = contact_id(&identifier).and_then(|id| service.listings(id));
    respond(result, |listings| {
        let payload = json!({
            "listing_ids": listings,
            "listing_count": listings.len(),
        });
        (StatusCode::OK, Json(payload)).into_response()
    })
}

fn listing_change<S, N, L>(
    service: &ContactService<S, N, L>,
    identifier: &str,
    listing_id: u64,
    attach: bool,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    let result = contact_id(identifier).and_then(|id| {
        let listing = ListingId::new(listing_id)?;
        let changed = if attach {
            service.attach_listing(id, listing)?
        } else {
            service.remove_listing(id, listing)?
        };
        let listings = service.listings(id)?;
        Ok((id, listing, changed, listings))
    });

    respond(result, |(id, listing, changed, listings)| {
        let payload = json!({
            "contact_id": id,
            "listing_id": listing,
            "changed": changed,
            "listing_ids": listings,
        });
        (StatusCode::OK, Json(payload)).into_response()
    })
}

pub(crate) async fn attach_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path((identifier, listing_id)): Path<(String, u64)>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    listing_change(&service, &identifier, listing_id, true)
}

pub(crate) async fn remove_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path((identifier, listing_id)): Path<(String, u64)>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    listing_change(&service, &identifier, listing_id, false)
}

pub(crate) async fn listing_contacts_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path(listing_id): Path<u64>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    let result = ListingId::new(listing_id)
        .map_err(ContactError::from)
        .and_then(|listing| service.contacts_for_listing(listing));
    respond(result, |contacts| {
        let payload = json!({
            "listing_id": listing_id,
            "contact_ids": contacts,
        });
        (StatusCode::OK, Json(payload)).into_response()
    })
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NotesQuery {
    #[serde(default)]
    per_page: Option<usize>,
    #[serde(default)]
    page: Option<usize>,
}

pub(crate) async fn notes_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path(identifier): Path<String>,
    Query(query): Query<NotesQuery>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    let per_page = query
        .per_page
        .unwrap_or(service.settings().notes_page_size);
    let result = contact_id(&identifier).and_then(|id| {
        let page = NotePage::new(per_page, query.page.unwrap_or(1))?;
        let notes = service.notes(id, page)?;
        let total = service.notes_count(id)?;
        Ok((page, notes, total))
    });

    respond(result, |(page, notes, total)| {
        let payload = json!({
            "notes": notes,
            "total": total,
            "page": page.page,
            "per_page": page.per_page,
        });
        (StatusCode::OK, Json(payload)).into_response()
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct NoteRequest {
    note: String,
    #[serde(default)]
    note_type: Option<String>,
    #[serde(default)]
    listing_id: Option<u64>,
}

pub(crate) async fn add_note_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path(identifier): Path<String>,
    Json(request): Json<NoteRequest>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    let note_type = request.note_type.map(NoteType::new).unwrap_or_default();
    let result = contact_id(&identifier).and_then(|id| {
        service.add_note(
            id,
            &request.note,
            note_type,
            request.listing_id.map(ListingId),
        )
    });
    respond(result, |note| (StatusCode::CREATED, Json(note)).into_response())
}

pub(crate) async fn property_handler<S, N, L>(
    State(service): State<SharedService<S, N, L>>,
    Path((identifier, property)): Path<(String, String)>,
) -> Response
where
    S: RecordStore + 'static,
    N: NoteStore + 'static,
    L: ListingIndex + 'static,
{
    let result = contact_id(&identifier).and_then(|id| {
        let property: ContactProperty = property.parse()?;
        let value = service.property(id, property)?;
        Ok((property, value))
    });
    respond(result, |(property, value)| {
        let payload = json!({
            "property": property.name(),
            "value": value,
        });
        (StatusCode::OK, Json(payload)).into_response()
    })
}
