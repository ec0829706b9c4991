//! Contact ↔ listing interest index.
//!
//! [`MemoryListingIndex`] keeps one edge table so both directions always agree.
//! [`MetaListingIndex`] stores the two directions as independent id lists in record meta; it
//! restores the contact side when the listing-side write fails, but two concurrent writers on
//! the same contact still race (last write wins on the whole list).

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::domain::{ContactId, ListingId, RecordId};
use super::store::{
    coerce_ids, ids_value, MetaStore, StoreError, CONTACT_LISTINGS_KEY, LISTING_CONTACTS_KEY,
};

pub trait ListingIndex: Send + Sync {
    /// Returns true when the edge was added, false when it already existed.
    fn link(&self, contact: ContactId, listing: ListingId) -> Result<bool, StoreError>;
    /// Returns true when an edge was removed.
    fn unlink(&self, contact: ContactId, listing: ListingId) -> Result<bool, StoreError>;
    fn listings_for(&self, contact: ContactId) -> Result<Vec<ListingId>, StoreError>;
    fn contacts_for(&self, listing: ListingId) -> Result<Vec<ContactId>, StoreError>;
    /// Drops every edge of `contact`, returning the listings it was linked to.
    fn purge_contact(&self, contact: ContactId) -> Result<Vec<ListingId>, StoreError>;
}

impl<T: ListingIndex + ?Sized> ListingIndex for Arc<T> {
    fn link(&self, contact: ContactId, listing: ListingId) -> Result<bool, StoreError> {
        (**self).link(contact, listing)
    }

    fn unlink(&self, contact: ContactId, listing: ListingId) -> Result<bool, StoreError> {
        (**self).unlink(contact, listing)
    }

    fn listings_for(&self, contact: ContactId) -> Result<Vec<ListingId>, StoreError> {
        (**self).listings_for(contact)
    }

    fn contacts_for(&self, listing: ListingId) -> Result<Vec<ContactId>, StoreError> {
        (**self).contacts_for(listing)
    }

    fn purge_contact(&self, contact: ContactId) -> Result<Vec<ListingId>, StoreError> {
        (**self).purge_contact(contact)
    }
}

/// Join table of `(contact, listing)` edges behind one lock.
#[derive(Clone, Default)]
pub struct MemoryListingIndex {
    edges: Arc<Mutex<BTreeSet<(ContactId, ListingId)>>>,
}

impl MemoryListingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn edges(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeSet<(ContactId, ListingId)>>, StoreError> {
        self.edges
            .lock()
            .map_err(|_| StoreError::Unavailable("listing index lock poisoned".to_string()))
    }
}

impl ListingIndex for MemoryListingIndex {
    fn link(&self, contact: ContactId, listing: ListingId) -> Result<bool, StoreError> {
        Ok(self.edges()?.insert((contact, listing)))
    }

    fn unlink(&self, contact: ContactId, listing: ListingId) -> Result<bool, StoreError> {
        Ok(self.edges()?.remove(&(contact, listing)))
    }

    fn listings_for(&self, contact: ContactId) -> Result<Vec<ListingId>, StoreError> {
        Ok(self
            .edges()?
            .range((contact, ListingId(0))..=(contact, ListingId(u64::MAX)))
            .map(|(_, listing)| *listing)
            .collect())
    }

    fn contacts_for(&self, listing: ListingId) -> Result<Vec<ContactId>, StoreError> {
        Ok(self
            .edges()?
            .iter()
            .filter(|(_, linked)| *linked == listing)
            .map(|(contact, _)| *contact)
            .collect())
    }

    fn purge_contact(&self, contact: ContactId) -> Result<Vec<ListingId>, StoreError> {
        let mut edges = self.edges()?;
        let listings: Vec<ListingId> = edges
            .range((contact, ListingId(0))..=(contact, ListingId(u64::MAX)))
            .map(|(_, listing)| *listing)
            .collect();
        for listing in &listings {
            edges.remove(&(contact, *listing));
        }
        Ok(listings)
    }
}

/// Two meta-stored id lists: `contact_listings` on the contact, `listing_contacts` on the listing.
///
/// Listings are external records with their own id space, so the listing side lives in a
/// separate meta store; sharing one store would alias listing N with contact N.
pub struct MetaListingIndex<C, L> {
    contacts: Arc<C>,
    listings: Arc<L>,
}

impl<C: MetaStore, L: MetaStore> MetaListingIndex<C, L> {
    pub fn new(contact_meta: Arc<C>, listing_meta: Arc<L>) -> Self {
        Self {
            contacts: contact_meta,
            listings: listing_meta,
        }
    }

    fn contact_ids(&self, contact: ContactId) -> Result<Vec<u64>, StoreError> {
        let value = self.contacts.get_meta(contact.into(), CONTACT_LISTINGS_KEY)?;
        Ok(coerce_ids(value.as_ref()))
    }

    fn write_contact_ids(&self, contact: ContactId, ids: &[u64]) -> Result<(), StoreError> {
        self.contacts.set_meta(
            contact.into(),
            CONTACT_LISTINGS_KEY,
            ids_value(ids.iter().copied()),
        )
    }

    fn listing_ids(&self, listing: ListingId) -> Result<Vec<u64>, StoreError> {
        let value = self.listings.get_meta(listing.into(), LISTING_CONTACTS_KEY)?;
        Ok(coerce_ids(value.as_ref()))
    }

    fn write_listing_ids(&self, listing: ListingId, ids: &[u64]) -> Result<(), StoreError> {
        self.listings.set_meta(
            listing.into(),
            LISTING_CONTACTS_KEY,
            ids_value(ids.iter().copied()),
        )
    }

    /// Applies `edit` to the listing side; on failure puts the contact side back to `previous`.
    fn update_listing_side(
        &self,
        contact: ContactId,
        listing: ListingId,
        previous: &[u64],
        edit: impl FnOnce(&mut Vec<u64>),
    ) -> Result<(), StoreError> {
        let outcome = self.listing_ids(listing).and_then(|mut contacts| {
            edit(&mut contacts);
            self.write_listing_ids(listing, &contacts)
        });

        if let Err(err) = outcome {
            warn!(%contact, %listing, error = %err, "listing-side write failed, restoring contact listings");
            self.write_contact_ids(contact, previous)?;
            return Err(err);
        }
        Ok(())
    }
}

impl<C: MetaStore, L: MetaStore> ListingIndex for MetaListingIndex<C, L> {
    fn link(&self, contact: ContactId, listing: ListingId) -> Result<bool, StoreError> {
        let previous = self.contact_ids(contact)?;
        if previous.contains(&listing.0) {
            return Ok(false);
        }

        let mut listings = previous.clone();
        listings.push(listing.0);
        self.write_contact_ids(contact, &listings)?;

        self.update_listing_side(contact, listing, &previous, |contacts| {
            if !contacts.contains(&contact.0) {
                contacts.push(contact.0);
            }
        })?;
        Ok(true)
    }

    fn unlink(&self, contact: ContactId, listing: ListingId) -> Result<bool, StoreError> {
        let previous = self.contact_ids(contact)?;
        if !previous.contains(&listing.0) {
            return Ok(false);
        }

        let listings: Vec<u64> = previous
            .iter()
            .copied()
            .filter(|id| *id != listing.0)
            .collect();
        self.write_contact_ids(contact, &listings)?;

        self.update_listing_side(contact, listing, &previous, |contacts| {
            contacts.retain(|id| *id != contact.0);
        })?;
        Ok(true)
    }

    fn listings_for(&self, contact: ContactId) -> Result<Vec<ListingId>, StoreError> {
        let mut seen = BTreeSet::new();
        Ok(self
            .contact_ids(contact)?
            .into_iter()
            .filter(|id| seen.insert(*id))
            .map(ListingId)
            .collect())
    }

    fn contacts_for(&self, listing: ListingId) -> Result<Vec<ContactId>, StoreError> {
        let mut seen = BTreeSet::new();
        Ok(self
            .listing_ids(listing)?
            .into_iter()
            .filter(|id| seen.insert(*id))
            .map(ContactId)
            .collect())
    }

    fn purge_contact(&self, contact: ContactId) -> Result<Vec<ListingId>, StoreError> {
        let listings = self.listings_for(contact)?;
        for listing in &listings {
            let mut contacts = self.listing_ids(*listing)?;
            contacts.retain(|id| *id != contact.0);
            self.write_listing_ids(*listing, &contacts)?;
        }
        self.contacts.delete_meta(contact.into(), CONTACT_LISTINGS_KEY)?;
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::memory::MemoryContentStore;
    use crate::contacts::store::{ContentStore, MetaValue};
    use serde_json::json;

    /// Fails every write to the listing-side key.
    struct ListingWritesFail(MemoryContentStore);

    impl MetaStore for ListingWritesFail {
        fn get_meta(&self, record: RecordId, key: &str) -> Result<Option<MetaValue>, StoreError> {
            self.0.get_meta(record, key)
        }

        fn set_meta(
            &self,
            record: RecordId,
            key: &str,
            value: MetaValue,
        ) -> Result<(), StoreError> {
            if key == LISTING_CONTACTS_KEY {
                return Err(StoreError::Unavailable("listing meta offline".to_string()));
            }
            self.0.set_meta(record, key, value)
        }

        fn delete_meta(&self, record: RecordId, key: &str) -> Result<bool, StoreError> {
            self.0.delete_meta(record, key)
        }
    }

    fn both_indexes() -> Vec<(&'static str, Box<dyn ListingIndex>)> {
        vec![
            (
                "join_table",
                Box::new(MemoryListingIndex::new()) as Box<dyn ListingIndex>,
            ),
            (
                "meta",
                Box::new(MetaListingIndex::new(
                    Arc::new(MemoryContentStore::new()),
                    Arc::new(MemoryContentStore::new()),
                )) as Box<dyn ListingIndex>,
            ),
        ]
    }

    #[test]
    fn link_is_idempotent_and_visible_from_both_sides() {
        for (name, index) in both_indexes() {
            assert!(index.link(ContactId(1), ListingId(10)).expect("link"), "{name}");
            assert!(!index.link(ContactId(1), ListingId(10)).expect("relink"), "{name}");
            index.link(ContactId(2), ListingId(10)).expect("link");

            assert_eq!(
                index.listings_for(ContactId(1)).expect("listings"),
                vec![ListingId(10)],
                "{name}"
            );
            assert_eq!(
                index.contacts_for(ListingId(10)).expect("contacts"),
                vec![ContactId(1), ContactId(2)],
                "{name}"
            );
        }
    }

    #[test]
    fn unlink_reports_whether_anything_changed() {
        for (name, index) in both_indexes() {
            index.link(ContactId(1), ListingId(10)).expect("link");
            index.link(ContactId(1), ListingId(11)).expect("link");

            assert!(index.unlink(ContactId(1), ListingId(10)).expect("unlink"), "{name}");
            assert!(!index.unlink(ContactId(1), ListingId(10)).expect("again"), "{name}");
            assert_eq!(
                index.listings_for(ContactId(1)).expect("listings"),
                vec![ListingId(11)],
                "{name}"
            );
            assert!(index.contacts_for(ListingId(10)).expect("contacts").is_empty());
        }
    }

    #[test]
    fn purge_clears_listing_back_references() {
        for (name, index) in both_indexes() {
            index.link(ContactId(1), ListingId(10)).expect("link");
            index.link(ContactId(1), ListingId(11)).expect("link");
            index.link(ContactId(2), ListingId(11)).expect("link");

            let purged = index.purge_contact(ContactId(1)).expect("purge");
            assert_eq!(purged, vec![ListingId(10), ListingId(11)], "{name}");
            assert!(index.listings_for(ContactId(1)).expect("listings").is_empty());
            assert!(index.contacts_for(ListingId(10)).expect("contacts").is_empty());
            assert_eq!(
                index.contacts_for(ListingId(11)).expect("contacts"),
                vec![ContactId(2)],
                "{name}"
            );
        }
    }

    #[test]
    fn meta_index_restores_contact_side_when_listing_write_fails() {
        let contacts = Arc::new(MemoryContentStore::new());
        contacts
            .set_meta(RecordId(1), CONTACT_LISTINGS_KEY, json!([7]))
            .expect("seed");
        let listings = Arc::new(ListingWritesFail(MemoryContentStore::new()));
        let index = MetaListingIndex::new(contacts, listings);

        let err = index
            .link(ContactId(1), ListingId(10))
            .expect_err("listing side fails");
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(
            index.listings_for(ContactId(1)).expect("listings"),
            vec![ListingId(7)]
        );
    }

    #[test]
    fn meta_index_tolerates_non_list_values() {
        let store = Arc::new(MemoryContentStore::new());
        store
            .set_meta(RecordId(1), CONTACT_LISTINGS_KEY, json!("corrupted"))
            .expect("seed");
        let index = MetaListingIndex::new(store.clone(), Arc::new(MemoryContentStore::new()));

        assert!(index.listings_for(ContactId(1)).expect("listings").is_empty());
        assert!(index.link(ContactId(1), ListingId(3)).expect("link"));
        assert_eq!(
            store
                .get_meta(RecordId(1), CONTACT_LISTINGS_KEY)
                .expect("read"),
            Some(json!([3]))
        );
    }

    #[test]
    fn meta_index_keeps_listing_ids_apart_from_contact_ids() {
        let contacts = Arc::new(MemoryContentStore::new());
        let listings = Arc::new(MemoryContentStore::new());
        let index = MetaListingIndex::new(contacts.clone(), listings.clone());

        index.link(ContactId(2), ListingId(1)).expect("link");
        // Dropping contact record 1 cascades its meta; listing 1 must be unaffected.
        contacts.delete(RecordId(1)).expect("delete contact record");

        assert_eq!(
            index.contacts_for(ListingId(1)).expect("contacts"),
            vec![ContactId(2)]
        );
        assert_eq!(
            contacts
                .get_meta(RecordId(1), LISTING_CONTACTS_KEY)
                .expect("read"),
            None
        );
        assert_eq!(
            listings
                .get_meta(RecordId(1), LISTING_CONTACTS_KEY)
                .expect("read"),
            Some(json!([2]))
        );
    }
}
