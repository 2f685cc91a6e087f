//! Synchronizes the managed partition of a submission into a record table.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::model::{Inbound, ManagedRecord, Outbound};
use crate::store::{RecordStore, StoreError};

/// Tag-indexed snapshot of the records a pass may delete.
///
/// Taken before any write of the pass; records with an empty tag are never
/// part of it.
#[derive(Debug, Clone)]
pub struct Baseline<R> {
    by_tag: BTreeMap<String, R>,
}

impl<R: ManagedRecord> Baseline<R> {
    pub fn from_records(records: impl IntoIterator<Item = R>) -> Self {
        let by_tag = records
            .into_iter()
            .filter(|record| !record.tag().is_empty())
            .map(|record| (record.tag().to_string(), record))
            .collect();
        Self { by_tag }
    }

    pub fn get(&self, tag: &str) -> Option<&R> {
        self.by_tag.get(tag)
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

impl<R> Default for Baseline<R> {
    fn default() -> Self {
        Self {
            by_tag: BTreeMap::new(),
        }
    }
}

impl Baseline<Inbound> {
    /// Every stored inbound is subject to deletion by absence.
    pub fn inbounds(all: &[Inbound]) -> Self {
        Self::from_records(all.iter().cloned())
    }
}

impl Baseline<Outbound> {
    /// Only enabled outbounds are subject to deletion by absence.
    pub fn enabled_outbounds(all: &[Outbound]) -> Self {
        Self::from_records(all.iter().filter(|outbound| outbound.enable).cloned())
    }
}

/// What one synchronization did to a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl SyncReport {
    /// Whether the table was left as it was.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Upsert every submitted record, then delete baseline tags that were not
/// submitted.
///
/// A record with an id that already equals its stored row is not rewritten.
pub fn sync_records<R, S>(
    store: &mut S,
    submitted: Vec<R>,
    baseline: &Baseline<R>,
) -> Result<SyncReport, StoreError>
where
    R: ManagedRecord,
    S: RecordStore<R> + ?Sized,
{
    let mut report = SyncReport::default();
    let mut seen = HashSet::new();

    for record in submitted {
        if record.tag().is_empty() {
            continue;
        }
        seen.insert(record.tag().to_string());

        match record.id() {
            Some(id) if store.get(id).as_ref() == Some(&record) => {
                report.unchanged += 1;
            }
            Some(id) => {
                debug!("Updating {} '{}' (id {})", R::KIND, record.tag(), id);
                store.save(record)?;
                report.updated += 1;
            }
            None => {
                let saved = store.save(record)?;
                debug!(
                    "Created {} '{}' (id {:?})",
                    R::KIND,
                    saved.tag(),
                    saved.id()
                );
                report.created += 1;
            }
        }
    }

    for (tag, record) in &baseline.by_tag {
        if seen.contains(tag) {
            continue;
        }
        if let Some(id) = record.id() {
            debug!("Deleting {} '{}' (id {})", R::KIND, tag, id);
            store.delete_by_id(id)?;
            report.deleted += 1;
        }
    }

    Ok(report)
}
