use crate::infra::{build_contact_service, ApiContactService};
use clap::Args;
use listing_contacts::config::{ContactsConfig, ListingIndexKind};
use listing_contacts::contacts::{
    ContactError, ContactFields, ContactId, ContactProperty, ContactUpdate, ListingId, NotePage,
    NoteType, RecordingObserver, TracingObserver,
};
use listing_contacts::error::AppError;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Buyer name used for the scripted inquiry.
    #[arg(long, default_value = "Jordan Rivera")]
    pub(crate) name: String,
    /// Buyer email; repeated inquiries with the same address reuse the contact.
    #[arg(long, default_value = "jordan.rivera@example.com")]
    pub(crate) email: String,
    /// Listings the buyer asks about.
    #[arg(long = "listing", value_delimiter = ',', default_values_t = [1204_u64, 1377])]
    pub(crate) listings: Vec<u64>,
    /// Listing-interest index backing the walkthrough (join_table or meta).
    #[arg(long, value_parser = ListingIndexKind::parse, default_value = "join_table")]
    pub(crate) listing_index: ListingIndexKind,
    /// Print the final contact as JSON instead of a summary.
    #[arg(long)]
    pub(crate) json: bool,
    /// Keep the contact instead of deleting it at the end.
    #[arg(long)]
    pub(crate) keep: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        name,
        email,
        listings,
        listing_index,
        json,
        keep,
    } = args;

    let recorder = RecordingObserver::default();
    let config = ContactsConfig {
        listing_index,
        ..ContactsConfig::default()
    };
    let service = build_contact_service(
        &config,
        vec![Arc::new(TracingObserver), Arc::new(recorder.clone())],
    );

    println!("Listing contacts demo ({listing_index:?} index)");

    let first = service.upsert_by_email(ContactFields {
        name: name.clone(),
        email: email.clone(),
    })?;
    let contact = first.contact().clone();
    println!(
        "- inquiry from {} <{}>: contact #{} {}",
        contact.name,
        contact.email,
        contact.id,
        first.label()
    );

    for raw in listings {
        let listing = ListingId::new(raw).map_err(ContactError::from)?;
        let added = service.attach_listing(contact.id, listing)?;
        let verb = if added { "attached" } else { "already attached" };
        println!("- listing #{listing} {verb}");
        service.add_note(
            contact.id,
            &format!("Asked for a showing at listing #{listing}"),
            NoteType::new("showing_request"),
            Some(listing),
        )?;
    }

    let repeat = service.upsert_by_email(ContactFields {
        name: format!("{name} (returning)"),
        email: email.to_ascii_uppercase(),
    })?;
    println!(
        "- repeat inquiry with {}: contact #{} {}",
        email.to_ascii_uppercase(),
        repeat.contact().id,
        repeat.label()
    );

    let contact = service.update(
        contact.id,
        ContactUpdate {
            name: Some(name),
            email: None,
        },
    )?;

    render_contact(&service, contact.id, json)?;

    println!("\nLifecycle events");
    for event in recorder.names() {
        println!("- {event}");
    }

    if keep {
        return Ok(());
    }

    let released = service.listings(contact.id)?;
    service.delete(contact.id)?;
    println!(
        "\nDeleted contact #{}; released {} listing(s)",
        contact.id,
        released.len()
    );
    for listing in released {
        let remaining = service.contacts_for_listing(listing)?;
        println!("- listing #{listing}: {} interested contact(s)", remaining.len());
    }
    Ok(())
}

fn render_contact(
    service: &ApiContactService,
    id: ContactId,
    json: bool,
) -> Result<(), AppError> {
    let contact = service.get(id)?;
    if json {
        match serde_json::to_string_pretty(&contact) {
            Ok(payload) => println!("\n{payload}"),
            Err(err) => println!("\nContact payload unavailable: {err}"),
        }
        return Ok(());
    }

    println!("\nContact #{}", contact.id);
    for property in [
        ContactProperty::Name,
        ContactProperty::Email,
        ContactProperty::ListingCount,
        ContactProperty::NotesCount,
    ] {
        let value = service.property(id, property)?;
        let rendered = serde_json::to_string(&value).unwrap_or_else(|_| "?".to_string());
        println!("- {}: {}", property.name(), rendered);
    }

    let notes = service.notes(id, NotePage::first(5).map_err(ContactError::from)?)?;
    println!("Recent notes");
    for note in notes {
        let listing = note
            .listing_id
            .map(|listing| format!(" (listing #{listing})"))
            .unwrap_or_default();
        println!("- [{}] {}{}", note.note_type, note.content, listing);
    }
    Ok(())
}
