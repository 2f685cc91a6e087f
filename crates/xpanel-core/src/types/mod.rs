//! Shared core types used across documents, records and storage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two kinds of entries that can be managed as database records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Listener entries under `inbounds`.
    Inbound,
    /// Upstream entries under `outbounds`.
    Outbound,
}

impl ResourceKind {
    /// Top-level document key holding entries of this kind.
    pub fn entries_key(self) -> &'static str {
        match self {
            ResourceKind::Inbound => "inbounds",
            ResourceKind::Outbound => "outbounds",
        }
    }

    /// Keys an entry must carry before it can become a managed record.
    pub fn required_keys(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Inbound => &["port", "protocol"],
            ResourceKind::Outbound => &["protocol"],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Inbound => f.write_str("inbound"),
            ResourceKind::Outbound => f.write_str("outbound"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_key_matches_document_layout() {
        assert_eq!(ResourceKind::Inbound.entries_key(), "inbounds");
        assert_eq!(ResourceKind::Outbound.entries_key(), "outbounds");
    }

    #[test]
    fn inbound_requires_port_and_protocol() {
        assert_eq!(ResourceKind::Inbound.required_keys(), &["port", "protocol"]);
        assert_eq!(ResourceKind::Outbound.required_keys(), &["protocol"]);
    }
}
