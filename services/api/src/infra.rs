use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use listing_contacts::config::{ContactsConfig, ListingIndexKind};
use listing_contacts::contacts::{
    ContactObserver, ContactService, ListingIndex, MemoryContentStore, MemoryListingIndex,
    MemoryNoteStore, MetaListingIndex,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Contact service wired to the in-memory stores, with the index chosen at startup.
pub(crate) type ApiContactService =
    ContactService<MemoryContentStore, MemoryNoteStore, Arc<dyn ListingIndex>>;

pub(crate) fn listing_index(
    kind: ListingIndexKind,
    records: &Arc<MemoryContentStore>,
) -> Arc<dyn ListingIndex> {
    match kind {
        ListingIndexKind::JoinTable => Arc::new(MemoryListingIndex::new()),
        ListingIndexKind::Meta => Arc::new(MetaListingIndex::new(
            records.clone(),
            Arc::new(MemoryContentStore::new()),
        )),
    }
}

pub(crate) fn build_contact_service(
    config: &ContactsConfig,
    observers: Vec<Arc<dyn ContactObserver>>,
) -> ApiContactService {
    let records = Arc::new(MemoryContentStore::new());
    let index = listing_index(config.listing_index, &records);
    let service = ContactService::new(
        records,
        Arc::new(MemoryNoteStore::new()),
        Arc::new(index),
        config.settings(),
    );
    observers
        .into_iter()
        .fold(service, |service, observer| service.with_observer(observer))
}
