//! Record operations for the panel's form channel.
//!
//! These write straight to the record tables; the reconciler picks the
//! result up on the next document assembly. A tag the template owns can
//! never be given to a record, or the entry would have two owners.

mod inbound;
mod outbound;

pub use inbound::InboundService;
pub use outbound::OutboundService;

use thiserror::Error;

use crate::document::{ConfigDocument, DocumentError};
use crate::reconcile::TemplateTags;
use crate::store::{StoreError, TemplateStore, Transaction};
use crate::types::ResourceKind;

/// Errors from form-channel writes.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{kind} tag '{tag}' belongs to the advanced-settings template")]
    TemplateOwned { kind: ResourceKind, tag: String },

    #[error("Stored template is unreadable: {0}")]
    StoredTemplate(#[source] DocumentError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Fail when the current template already owns `tag`.
fn ensure_not_template_owned(
    tx: &Transaction<'_>,
    default_template: &ConfigDocument,
    kind: ResourceKind,
    tag: &str,
) -> Result<(), ServiceError> {
    let owned = TemplateTags::from_stored(tx.template(), default_template, kind)
        .map_err(ServiceError::StoredTemplate)?;
    if owned.contains(tag) {
        return Err(ServiceError::TemplateOwned {
            kind,
            tag: tag.to_string(),
        });
    }
    Ok(())
}
