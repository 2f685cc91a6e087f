//! Database-managed inbound and outbound records.

mod inbound;
mod outbound;

pub use inbound::Inbound;
pub use outbound::Outbound;

use serde_json::{Map, Value};

use crate::types::ResourceKind;

/// A record that is identified by a surrogate id and a unique tag.
pub trait ManagedRecord: Clone + PartialEq + std::fmt::Debug {
    const KIND: ResourceKind;

    /// Surrogate identity; `None` until the record has been stored.
    fn id(&self) -> Option<u64>;

    fn set_id(&mut self, id: u64);

    fn tag(&self) -> &str;
}

/// Insert a stored JSON text section into an entry object.
///
/// Empty text is omitted rather than rendered as `null`.
pub(crate) fn insert_section(
    entry: &mut Map<String, Value>,
    key: &str,
    text: &str,
) -> Result<(), serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(());
    }
    let value: Value = serde_json::from_str(text)?;
    entry.insert(key.to_string(), value);
    Ok(())
}
