mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use xpanel_core::prelude::*;
use xpanel_core::store::{Backend, Database, MemoryBackend};

use support::{empty_template, inbounds, outbounds, stored_template};

/// Memory backend whose writes can be switched off.
#[derive(Debug, Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    fail_writes: Arc<AtomicBool>,
}

impl Backend for FlakyBackend {
    fn load(&self) -> Result<Database, StoreError> {
        self.inner.load()
    }

    fn persist(&self, database: &Database) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("disk full"));
        }
        self.inner.persist(database)
    }
}

fn flaky_reconciler() -> (Reconciler, Arc<AtomicBool>) {
    let backend = FlakyBackend::default();
    let switch = Arc::clone(&backend.fail_writes);
    let store = Arc::new(PanelStore::new(backend));
    (Reconciler::with_template(store, empty_template()), switch)
}

#[test]
fn failed_persist_leaves_previous_state() {
    let (reconciler, fail_writes) = flaky_reconciler();
    reconciler
        .apply(r#"{"outbounds":[{"tag":"keep","protocol":"freedom"}]}"#)
        .expect("apply should succeed");
    let before_template = stored_template(reconciler.store());

    fail_writes.store(true, Ordering::SeqCst);
    let err = reconciler
        .apply(r#"{"inbounds":[{"tag":"new","protocol":"http","port":80}],"outbounds":[]}"#)
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Storage(StoreError::Backend { .. })));
    assert!(inbounds(reconciler.store()).is_empty());
    assert_eq!(outbounds(reconciler.store()).len(), 1);
    assert_eq!(stored_template(reconciler.store()), before_template);
}

#[test]
fn noop_apply_does_not_write() {
    let (reconciler, fail_writes) = flaky_reconciler();
    let submission = r#"{"outbounds":[{"tag":"keep","protocol":"freedom"}]}"#;
    reconciler.apply(submission).expect("apply should succeed");

    fail_writes.store(true, Ordering::SeqCst);
    let report = reconciler.apply(submission).expect("apply should succeed");

    assert!(!report.needs_restart());
}

#[test]
fn service_write_failure_is_reported() {
    let (reconciler, fail_writes) = flaky_reconciler();
    let service = OutboundService::new(Arc::clone(reconciler.store()), empty_template());

    fail_writes.store(true, Ordering::SeqCst);
    let err = service
        .add(Outbound {
            tag: "direct".to_string(),
            protocol: "freedom".to_string(),
            enable: true,
            ..Default::default()
        })
        .unwrap_err();

    assert!(matches!(err, ServiceError::Storage(StoreError::Backend { .. })));
    assert!(service.list().expect("list should succeed").is_empty());
}
