#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;
use xpanel_core::document::{self, ConfigDocument};
use xpanel_core::prelude::*;

pub const EMPTY_TEMPLATE: &str = r#"{"inbounds":[],"outbounds":[]}"#;

pub fn empty_template() -> ConfigDocument {
    document::decode(EMPTY_TEMPLATE).expect("document should decode")
}

/// Reconciler over a fresh in-memory store with an empty default template.
pub fn reconciler() -> Reconciler {
    Reconciler::with_template(Arc::new(PanelStore::in_memory()), empty_template())
}

/// Outbound service over the reconciler's store and the same default template.
pub fn outbound_service(reconciler: &Reconciler) -> OutboundService {
    OutboundService::new(Arc::clone(reconciler.store()), empty_template())
}

pub fn inbounds(store: &PanelStore) -> Vec<Inbound> {
    store
        .read(|tx| Ok::<_, StoreError>(RecordStore::<Inbound>::list_all(tx)))
        .expect("read should succeed")
}

pub fn outbounds(store: &PanelStore) -> Vec<Outbound> {
    store
        .read(|tx| Ok::<_, StoreError>(RecordStore::<Outbound>::list_all(tx)))
        .expect("read should succeed")
}

/// Stored template text as JSON, `None` when nothing has been stored.
pub fn stored_template(store: &PanelStore) -> Option<Value> {
    store
        .read(|tx| Ok::<_, StoreError>(tx.template().map(str::to_string)))
        .expect("read should succeed")
        .map(|text| serde_json::from_str(&text).expect("stored template should be JSON"))
}

pub fn tags(entries: &[Value]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| entry["tag"].as_str().unwrap_or_default().to_string())
        .collect()
}
