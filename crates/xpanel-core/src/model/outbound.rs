use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ManagedRecord, insert_section};
use crate::types::ResourceKind;

/// An upstream managed through the panel's forms.
///
/// Only enabled outbounds are rendered into the engine document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub remark: String,
    pub enable: bool,
    pub tag: String,
    pub protocol: String,
    #[serde(default)]
    pub settings: String,
    #[serde(default)]
    pub stream_settings: String,
    #[serde(default)]
    pub proxy_settings: String,
    #[serde(default)]
    pub mux: String,
    /// Unix seconds
    #[serde(default)]
    pub created_at: i64,
    /// Unix seconds
    #[serde(default)]
    pub updated_at: i64,
}

impl Outbound {
    /// Render the record as an `outbounds` document entry.
    pub fn to_entry(&self) -> Result<Value, serde_json::Error> {
        let mut entry = Map::new();
        entry.insert("tag".to_string(), Value::from(self.tag.clone()));
        entry.insert("protocol".to_string(), Value::from(self.protocol.clone()));
        insert_section(&mut entry, "settings", &self.settings)?;
        insert_section(&mut entry, "streamSettings", &self.stream_settings)?;
        insert_section(&mut entry, "proxySettings", &self.proxy_settings)?;
        insert_section(&mut entry, "mux", &self.mux)?;
        Ok(Value::Object(entry))
    }
}

impl ManagedRecord for Outbound {
    const KIND: ResourceKind = ResourceKind::Outbound;

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    fn tag(&self) -> &str {
        &self.tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_entry_renders_all_sections() {
        let outbound = Outbound {
            tag: "chain".to_string(),
            protocol: "vless".to_string(),
            settings: r#"{"vnext":[]}"#.to_string(),
            proxy_settings: r#"{"tag":"direct"}"#.to_string(),
            mux: r#"{"enabled":false}"#.to_string(),
            enable: true,
            ..Default::default()
        };

        let entry = outbound.to_entry().unwrap();
        assert_eq!(
            entry,
            json!({
                "tag": "chain",
                "protocol": "vless",
                "settings": {"vnext": []},
                "proxySettings": {"tag": "direct"},
                "mux": {"enabled": false}
            })
        );
    }
}
