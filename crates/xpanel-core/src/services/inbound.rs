use std::sync::Arc;

use crate::model::Inbound;
use crate::store::{PanelStore, RecordStore, StoreError};

/// Read access to managed inbounds.
#[derive(Debug, Clone)]
pub struct InboundService {
    store: Arc<PanelStore>,
}

impl InboundService {
    pub fn new(store: Arc<PanelStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<Inbound>, StoreError> {
        self.store.read(|tx| Ok(RecordStore::<Inbound>::list_all(tx)))
    }

    pub fn get_by_tag(&self, tag: &str) -> Result<Option<Inbound>, StoreError> {
        Ok(self.list()?.into_iter().find(|inbound| inbound.tag == tag))
    }

    pub fn tags(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.list()?.into_iter().map(|inbound| inbound.tag).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Reconciler;

    #[test]
    fn lists_inbounds_created_by_apply() {
        let store = Arc::new(PanelStore::in_memory());
        Reconciler::new(Arc::clone(&store))
            .unwrap()
            .apply(r#"{"inbounds":[{"tag":"socks-in","protocol":"socks","port":1080}]}"#)
            .unwrap();

        let service = InboundService::new(store);
        assert_eq!(service.tags().unwrap(), vec!["socks-in"]);
        assert_eq!(service.get_by_tag("socks-in").unwrap().unwrap().port, 1080);
        assert!(service.get_by_tag("other").unwrap().is_none());
    }
}
