use std::sync::Arc;

use super::{ServiceError, ensure_not_template_owned};
use crate::document::ConfigDocument;
use crate::model::Outbound;
use crate::reconcile::builder::default_remark;
use crate::store::{PanelStore, RecordStore, StoreError};
use crate::types::ResourceKind;

/// Form-channel operations on managed outbounds.
#[derive(Debug, Clone)]
pub struct OutboundService {
    store: Arc<PanelStore>,
    default_template: ConfigDocument,
}

impl OutboundService {
    /// `default_template` stands in for the stored template until one exists.
    pub fn new(store: Arc<PanelStore>, default_template: ConfigDocument) -> Self {
        Self {
            store,
            default_template,
        }
    }

    /// All outbounds, enabled or not.
    pub fn list(&self) -> Result<Vec<Outbound>, StoreError> {
        self.store
            .read(|tx| Ok(RecordStore::<Outbound>::list_all(tx)))
    }

    /// Outbounds the engine document is assembled from.
    pub fn list_enabled(&self) -> Result<Vec<Outbound>, StoreError> {
        self.store.read(|tx| Ok(tx.enabled_outbounds()))
    }

    pub fn get(&self, id: u64) -> Result<Outbound, StoreError> {
        self.store.read(|tx| {
            RecordStore::<Outbound>::get(&*tx, id).ok_or(StoreError::NotFound {
                kind: ResourceKind::Outbound,
                id,
            })
        })
    }

    pub fn get_by_tag(&self, tag: &str) -> Result<Option<Outbound>, StoreError> {
        Ok(self.list()?.into_iter().find(|outbound| outbound.tag == tag))
    }

    /// Tags of every stored outbound.
    pub fn tags(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .map(|outbound| outbound.tag)
            .collect())
    }

    /// Store a new outbound. The tag must not be used by another outbound
    /// or by the template.
    pub fn add(&self, mut outbound: Outbound) -> Result<Outbound, ServiceError> {
        let now = chrono::Utc::now().timestamp();
        outbound.id = None;
        outbound.created_at = now;
        outbound.updated_at = now;
        outbound.remark = default_remark(&outbound.remark, &outbound.tag);

        let saved = self.store.transaction(|tx| {
            ensure_not_template_owned(
                tx,
                &self.default_template,
                ResourceKind::Outbound,
                &outbound.tag,
            )?;
            Ok::<_, ServiceError>(tx.save(outbound)?)
        })?;
        tracing::info!("Added outbound '{}'", saved.tag);
        Ok(saved)
    }

    /// Overwrite a stored outbound, keeping its creation time.
    pub fn update(&self, id: u64, mut outbound: Outbound) -> Result<Outbound, ServiceError> {
        self.store.transaction(|tx| {
            let existing = RecordStore::<Outbound>::get(&*tx, id).ok_or(StoreError::NotFound {
                kind: ResourceKind::Outbound,
                id,
            })?;
            ensure_not_template_owned(
                tx,
                &self.default_template,
                ResourceKind::Outbound,
                &outbound.tag,
            )?;
            outbound.id = Some(id);
            outbound.created_at = existing.created_at;
            outbound.updated_at = chrono::Utc::now().timestamp();
            outbound.remark = default_remark(&outbound.remark, &outbound.tag);
            Ok(tx.save(outbound)?)
        })
    }

    pub fn delete(&self, id: u64) -> Result<(), StoreError> {
        self.store
            .transaction(|tx| RecordStore::<Outbound>::delete_by_id(tx, id))
    }

    /// Delete the outbound carrying `tag`.
    ///
    /// Returns the removed record, or `None` when no outbound has the tag.
    pub fn delete_by_tag(&self, tag: &str) -> Result<Option<Outbound>, StoreError> {
        self.store.transaction(|tx| {
            let all = RecordStore::<Outbound>::list_all(&*tx);
            let Some(found) = all.into_iter().find(|outbound| outbound.tag == tag) else {
                return Ok(None);
            };
            if let Some(id) = found.id {
                RecordStore::<Outbound>::delete_by_id(tx, id)?;
            }
            Ok(Some(found))
        })
    }

    /// Enable or disable an outbound. Disabled outbounds are left out of the
    /// engine document and survive submissions that omit them.
    ///
    /// Enabling fails while the template owns the tag, which happens when an
    /// entry with that tag was kept in the template during the outbound's
    /// time out of the document.
    pub fn set_enabled(&self, id: u64, enable: bool) -> Result<Outbound, ServiceError> {
        self.store.transaction(|tx| {
            let mut outbound = RecordStore::<Outbound>::get(&*tx, id).ok_or(StoreError::NotFound {
                kind: ResourceKind::Outbound,
                id,
            })?;
            if outbound.enable == enable {
                return Ok(outbound);
            }
            if enable {
                ensure_not_template_owned(
                    tx,
                    &self.default_template,
                    ResourceKind::Outbound,
                    &outbound.tag,
                )?;
            }
            outbound.enable = enable;
            outbound.updated_at = chrono::Utc::now().timestamp();
            Ok(tx.save(outbound)?)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;
    use crate::store::TemplateStore;

    const TEMPLATE: &str = r#"{"inbounds":[],"outbounds":[{"tag":"blocked","protocol":"blackhole"}]}"#;

    fn service() -> OutboundService {
        let template = document::decode(TEMPLATE).expect("template should decode");
        OutboundService::new(Arc::new(PanelStore::in_memory()), template)
    }

    fn outbound(tag: &str) -> Outbound {
        Outbound {
            tag: tag.to_string(),
            protocol: "freedom".to_string(),
            enable: true,
            ..Default::default()
        }
    }

    #[test]
    fn add_sets_timestamps_and_remark() {
        let service = service();
        let saved = service.add(outbound("direct")).expect("add should succeed");

        assert_eq!(saved.id, Some(1));
        assert_eq!(saved.remark, "direct");
        assert!(saved.created_at > 0);
        assert_eq!(saved.created_at, saved.updated_at);
    }

    #[test]
    fn add_rejects_used_tag() {
        let service = service();
        service.add(outbound("direct")).expect("add should succeed");

        let err = service.add(outbound("direct")).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Storage(StoreError::TagConflict { .. })
        ));
    }

    #[test]
    fn add_rejects_tag_of_default_template() {
        let service = service();

        let err = service.add(outbound("blocked")).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::TemplateOwned { ref tag, .. } if tag == "blocked"
        ));
        assert!(service.list().expect("list should succeed").is_empty());
    }

    #[test]
    fn add_checks_stored_template_instead_of_default() {
        let service = service();
        service
            .store
            .transaction(|tx| {
                tx.save_template(r#"{"outbounds":[{"tag":"warp","protocol":"wireguard"}]}"#.to_string())
            })
            .expect("template should be stored");

        assert!(matches!(
            service.add(outbound("warp")).unwrap_err(),
            ServiceError::TemplateOwned { .. }
        ));
        service
            .add(outbound("blocked"))
            .expect("tag no longer in the stored template should be accepted");
    }

    #[test]
    fn unreadable_stored_template_blocks_writes() {
        let service = service();
        service
            .store
            .transaction(|tx| tx.save_template("not json".to_string()))
            .expect("template should be stored");

        assert!(matches!(
            service.add(outbound("direct")).unwrap_err(),
            ServiceError::StoredTemplate(_)
        ));
    }

    #[test]
    fn update_keeps_creation_time() {
        let service = service();
        let mut stored = service.add(outbound("direct")).expect("add should succeed");
        let created_at = stored.created_at;

        stored.created_at = 0;
        stored.protocol = "blackhole".to_string();
        let updated = service.update(1, stored).expect("update should succeed");

        assert_eq!(updated.created_at, created_at);
        assert_eq!(service.get(1).expect("get should succeed").protocol, "blackhole");
    }

    #[test]
    fn update_rejects_tag_of_another_outbound() {
        let service = service();
        service.add(outbound("a")).expect("add should succeed");
        service.add(outbound("b")).expect("add should succeed");

        let err = service.update(2, outbound("a")).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Storage(StoreError::TagConflict { ref tag, .. }) if tag == "a"
        ));
    }

    #[test]
    fn update_rejects_template_tag() {
        let service = service();
        service.add(outbound("a")).expect("add should succeed");

        let err = service.update(1, outbound("blocked")).unwrap_err();
        assert!(matches!(err, ServiceError::TemplateOwned { .. }));
        assert_eq!(service.tags().expect("tags should succeed"), vec!["a"]);
    }

    #[test]
    fn set_enabled_filters_list_enabled() {
        let service = service();
        service.add(outbound("a")).expect("add should succeed");
        service.add(outbound("b")).expect("add should succeed");

        service.set_enabled(1, false).expect("disable should succeed");

        let enabled: Vec<String> = service
            .list_enabled()
            .expect("list should succeed")
            .into_iter()
            .map(|outbound| outbound.tag)
            .collect();
        assert_eq!(enabled, vec!["b"]);
        assert_eq!(service.tags().expect("tags should succeed"), vec!["a", "b"]);
    }

    #[test]
    fn enabling_fails_once_template_took_the_tag() {
        let service = service();
        service.add(outbound("warp")).expect("add should succeed");
        service.set_enabled(1, false).expect("disable should succeed");
        service
            .store
            .transaction(|tx| {
                tx.save_template(r#"{"outbounds":[{"tag":"warp"}]}"#.to_string())
            })
            .expect("template should be stored");

        let err = service.set_enabled(1, true).unwrap_err();
        assert!(matches!(err, ServiceError::TemplateOwned { .. }));
        assert!(!service.get(1).expect("get should succeed").enable);
    }

    #[test]
    fn delete_by_tag_reports_missing() {
        let service = service();
        service.add(outbound("a")).expect("add should succeed");

        assert!(service.delete_by_tag("missing").expect("delete should succeed").is_none());
        let removed = service.delete_by_tag("a").expect("delete should succeed");
        assert_eq!(removed.map(|outbound| outbound.tag).as_deref(), Some("a"));
        assert!(service.list().expect("list should succeed").is_empty());
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let err = service().get(9).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 9, .. }));
    }
}
