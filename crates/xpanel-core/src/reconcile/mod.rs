//! Reconciliation between the advanced-settings document and managed records.
//!
//! Every top-level `inbounds`/`outbounds` entry of a submission is owned by
//! exactly one side. Template-owned entries are written back into the stored
//! template verbatim; managed entries become database records and are removed
//! from the template. A record whose tag disappears from a submission is
//! deleted, except for disabled outbounds.

pub mod builder;
pub mod classify;
pub mod sync;

pub use builder::{BuildError, build_inbound, build_outbound};
pub use classify::{Disposition, TemplateReason, TemplateTags, classify};
pub use sync::{Baseline, SyncReport, sync_records};

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::document::{self, ConfigDocument, ConfigEntry, DocumentError};
use crate::model::{Inbound, Outbound};
use crate::store::{PanelStore, RecordStore, StoreError, TemplateStore, Transaction};
use crate::types::ResourceKind;
use crate::validate::{ConfigInvalid, ConfigValidator, EngineValidator};

/// Errors that abort a reconciliation pass.
///
/// Nothing is persisted when any of these is returned.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Invalid submission: {0}")]
    Parse(#[source] DocumentError),

    #[error("Stored template is unreadable: {0}")]
    StoredTemplate(#[source] DocumentError),

    #[error("Duplicate {kind} tag in submission: {tag}")]
    DuplicateTag { kind: ResourceKind, tag: String },

    #[error(transparent)]
    ConfigInvalid(#[from] ConfigInvalid),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("Failed to encode template: {0}")]
    Encode(#[source] DocumentError),

    #[error("Stored {kind} '{tag}' has a corrupt section: {source}")]
    CorruptRecord {
        kind: ResourceKind,
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// An entry that looked managed but was kept in the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemotedEntry {
    pub kind: ResourceKind,
    pub tag: String,
    pub reason: String,
}

/// Outcome of one [`Reconciler::apply`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Whether the stored template text was rewritten
    pub template_changed: bool,

    /// Digest of the template as stored after the pass
    pub template_fingerprint: String,

    pub inbounds: SyncReport,

    pub outbounds: SyncReport,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub demoted: Vec<DemotedEntry>,
}

impl ApplyReport {
    /// Whether the proxy engine must reload its configuration.
    pub fn needs_restart(&self) -> bool {
        self.template_changed || !self.inbounds.is_noop() || !self.outbounds.is_noop()
    }
}

/// Applies submitted documents against one [`PanelStore`].
#[derive(Debug)]
pub struct Reconciler<V = EngineValidator> {
    store: Arc<PanelStore>,
    validator: V,
    default_template: ConfigDocument,
}

impl Reconciler<EngineValidator> {
    /// Reconciler with the engine validator and the built-in default template.
    pub fn new(store: Arc<PanelStore>) -> Result<Self, DocumentError> {
        Ok(Self::with_template(store, document::default_template()?))
    }

    /// Reconciler with the engine validator and an explicit default template.
    pub fn with_template(store: Arc<PanelStore>, default_template: ConfigDocument) -> Self {
        Self {
            store,
            validator: EngineValidator,
            default_template,
        }
    }
}

impl<V: ConfigValidator> Reconciler<V> {
    pub fn with_validator<W: ConfigValidator>(self, validator: W) -> Reconciler<W> {
        Reconciler {
            store: self.store,
            validator,
            default_template: self.default_template,
        }
    }

    pub fn store(&self) -> &Arc<PanelStore> {
        &self.store
    }

    /// Apply a submitted document.
    ///
    /// The whole pass runs as one storage transaction: classification,
    /// template merge, validation and both record synchronizations either all
    /// take effect or none does.
    pub fn apply(&self, raw: &str) -> Result<ApplyReport, ReconcileError> {
        let submitted = document::decode(raw).map_err(ReconcileError::Parse)?;
        for kind in [ResourceKind::Inbound, ResourceKind::Outbound] {
            check_unique_tags(&submitted, kind)?;
        }

        let report = self
            .store
            .transaction(|tx| self.apply_in(tx, &submitted))?;

        info!(
            template_changed = report.template_changed,
            inbounds_created = report.inbounds.created,
            inbounds_updated = report.inbounds.updated,
            inbounds_deleted = report.inbounds.deleted,
            outbounds_created = report.outbounds.created,
            outbounds_updated = report.outbounds.updated,
            outbounds_deleted = report.outbounds.deleted,
            demoted = report.demoted.len(),
            "Applied advanced settings"
        );
        Ok(report)
    }

    fn apply_in(
        &self,
        tx: &mut Transaction<'_>,
        submitted: &ConfigDocument,
    ) -> Result<ApplyReport, ReconcileError> {
        let previous_text = tx.template().map(str::to_string);
        let mut template = self.load_template(previous_text.as_deref())?;

        let inbound_tags = TemplateTags::collect(&template, ResourceKind::Inbound);
        let outbound_tags = TemplateTags::collect(&template, ResourceKind::Outbound);

        let all_inbounds: Vec<Inbound> = tx.list_all();
        let all_outbounds: Vec<Outbound> = tx.list_all();
        let inbound_baseline = Baseline::inbounds(&all_inbounds);
        let outbound_lookup = Baseline::from_records(all_outbounds.iter().cloned());
        let outbound_baseline = Baseline::enabled_outbounds(&all_outbounds);

        let mut demoted = Vec::new();
        let now = chrono::Utc::now().timestamp();

        let (inbound_entries, inbounds) = partition(
            submitted.entries(ResourceKind::Inbound),
            ResourceKind::Inbound,
            &inbound_tags,
            &mut demoted,
            |entry| build_inbound(entry, inbound_baseline.get(entry.tag())),
        );
        let (outbound_entries, outbounds) = partition(
            submitted.entries(ResourceKind::Outbound),
            ResourceKind::Outbound,
            &outbound_tags,
            &mut demoted,
            |entry| build_outbound(entry, outbound_lookup.get(entry.tag()), now),
        );

        template.set_entries(ResourceKind::Inbound, inbound_entries);
        template.set_entries(ResourceKind::Outbound, outbound_entries);
        template.overlay(
            submitted,
            &[
                ResourceKind::Inbound.entries_key(),
                ResourceKind::Outbound.entries_key(),
            ],
        );

        let text = document::encode(&template).map_err(ReconcileError::Encode)?;
        self.validator.validate(&text)?;

        let template_changed = previous_text.as_deref() != Some(text.as_str());
        if template_changed {
            debug!("Storing updated template");
            tx.save_template(text)?;
        }

        let inbounds = sync_records(tx, inbounds, &inbound_baseline)?;
        let outbounds = sync_records(tx, outbounds, &outbound_baseline)?;

        Ok(ApplyReport {
            template_changed,
            template_fingerprint: document::fingerprint(&template),
            inbounds,
            outbounds,
            demoted,
        })
    }

    /// The stored template, or the default one when nothing is stored.
    pub fn stored_template(&self) -> Result<ConfigDocument, ReconcileError> {
        self.store
            .read(|tx| self.load_template(tx.template()))
    }

    /// The combined document an operator edits: the stored template with
    /// every managed inbound and every enabled managed outbound appended.
    pub fn assemble(&self) -> Result<ConfigDocument, ReconcileError> {
        self.store.read(|tx| {
            let mut document = self.load_template(tx.template())?;

            let mut inbounds = document.entries(ResourceKind::Inbound).to_vec();
            let records: Vec<Inbound> = tx.list_all();
            for inbound in &records {
                inbounds.push(inbound.to_entry().map_err(|source| {
                    ReconcileError::CorruptRecord {
                        kind: ResourceKind::Inbound,
                        tag: inbound.tag.clone(),
                        source,
                    }
                })?);
            }

            let mut outbounds = document.entries(ResourceKind::Outbound).to_vec();
            for outbound in &tx.enabled_outbounds() {
                outbounds.push(outbound.to_entry().map_err(|source| {
                    ReconcileError::CorruptRecord {
                        kind: ResourceKind::Outbound,
                        tag: outbound.tag.clone(),
                        source,
                    }
                })?);
            }

            document.set_entries(ResourceKind::Inbound, inbounds);
            document.set_entries(ResourceKind::Outbound, outbounds);
            Ok(document)
        })
    }

    /// Decode and validate a submission without touching storage.
    pub fn check(&self, raw: &str) -> Result<ConfigDocument, ReconcileError> {
        let submitted = document::decode(raw).map_err(ReconcileError::Parse)?;
        for kind in [ResourceKind::Inbound, ResourceKind::Outbound] {
            check_unique_tags(&submitted, kind)?;
        }
        let text = document::encode(&submitted).map_err(ReconcileError::Encode)?;
        self.validator.validate(&text)?;
        Ok(submitted)
    }

    fn load_template(&self, stored: Option<&str>) -> Result<ConfigDocument, ReconcileError> {
        match stored {
            Some(text) => document::decode(text).map_err(ReconcileError::StoredTemplate),
            None => Ok(self.default_template.clone()),
        }
    }
}

/// A non-empty tag may appear only once per list.
fn check_unique_tags(document: &ConfigDocument, kind: ResourceKind) -> Result<(), ReconcileError> {
    let mut seen = HashSet::new();
    for entry in document.entries(kind).iter().filter_map(ConfigEntry::from_value) {
        let tag = entry.tag();
        if !tag.is_empty() && !seen.insert(tag) {
            return Err(ReconcileError::DuplicateTag {
                kind,
                tag: tag.to_string(),
            });
        }
    }
    Ok(())
}

/// Split submitted entries into template-owned values and built records.
///
/// Entries that classify as managed but fail to build are demoted to the
/// template, so the pass still succeeds for the rest of the list.
fn partition<R>(
    entries: &[Value],
    kind: ResourceKind,
    template_tags: &TemplateTags,
    demoted: &mut Vec<DemotedEntry>,
    build: impl Fn(&ConfigEntry<'_>) -> Result<R, BuildError>,
) -> (Vec<Value>, Vec<R>) {
    let mut template = Vec::new();
    let mut managed = Vec::new();

    for value in entries {
        let Some(entry) = ConfigEntry::from_value(value) else {
            template.push(value.clone());
            continue;
        };
        let tag = entry.tag();

        match classify(tag, template_tags, &entry, kind) {
            Disposition::Managed => match build(&entry) {
                Ok(record) => {
                    debug!("{kind} '{tag}' is database-managed");
                    managed.push(record);
                }
                Err(err) => {
                    warn!("Keeping {kind} '{tag}' in template: {err}");
                    demoted.push(DemotedEntry {
                        kind,
                        tag: tag.to_string(),
                        reason: err.to_string(),
                    });
                    template.push(value.clone());
                }
            },
            Disposition::Template(TemplateReason::Incomplete { missing }) => {
                warn!("Keeping {kind} '{tag}' in template: missing '{missing}'");
                demoted.push(DemotedEntry {
                    kind,
                    tag: tag.to_string(),
                    reason: format!("missing '{missing}'"),
                });
                template.push(value.clone());
            }
            Disposition::Template(reason) => {
                debug!("{kind} '{tag}' stays in template ({reason:?})");
                template.push(value.clone());
            }
        }
    }

    (template, managed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reconciler() -> Reconciler {
        let store = Arc::new(PanelStore::in_memory());
        Reconciler::with_template(
            store,
            document::decode(r#"{"inbounds":[],"outbounds":[]}"#).unwrap(),
        )
    }

    #[test]
    fn duplicate_tags_are_rejected_before_any_write() {
        let reconciler = reconciler();
        let raw = json!({
            "outbounds": [
                {"tag": "dup", "protocol": "freedom"},
                {"tag": "dup", "protocol": "blackhole"}
            ]
        })
        .to_string();

        let err = reconciler.apply(&raw).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::DuplicateTag {
                kind: ResourceKind::Outbound,
                ref tag
            } if tag == "dup"
        ));
        assert!(reconciler.store().read(|tx| Ok::<_, StoreError>(tx.template().is_none())).unwrap());
    }

    #[test]
    fn same_tag_across_kinds_is_allowed() {
        let reconciler = reconciler();
        let raw = json!({
            "inbounds": [{"tag": "shared", "protocol": "socks", "port": 1080}],
            "outbounds": [{"tag": "shared", "protocol": "freedom"}]
        })
        .to_string();

        let report = reconciler.apply(&raw).unwrap();
        assert_eq!(report.inbounds.created, 1);
        assert_eq!(report.outbounds.created, 1);
    }

    #[test]
    fn incomplete_entries_are_reported_as_demoted() {
        let reconciler = reconciler();
        let raw = json!({
            "inbounds": [{"tag": "draft", "protocol": "vless"}]
        })
        .to_string();

        let report = reconciler.apply(&raw).unwrap();
        assert_eq!(report.inbounds, SyncReport::default());
        assert_eq!(
            report.demoted,
            vec![DemotedEntry {
                kind: ResourceKind::Inbound,
                tag: "draft".to_string(),
                reason: "missing 'port'".to_string(),
            }]
        );
        assert!(report.template_changed);
    }

    #[test]
    fn needs_restart_tracks_any_change() {
        let mut report = ApplyReport::default();
        assert!(!report.needs_restart());

        report.outbounds.deleted = 1;
        assert!(report.needs_restart());
    }

    #[test]
    fn check_does_not_touch_storage() {
        let reconciler = reconciler();
        let raw = r#"{"inbounds":[{"tag":"a","protocol":"http","port":80}]}"#;

        reconciler.check(raw).unwrap();

        let records = reconciler
            .store()
            .read(|tx| Ok::<_, StoreError>(RecordStore::<Inbound>::list_all(tx)))
            .unwrap();
        assert!(records.is_empty());
    }
}
