use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ManagedRecord, insert_section};
use crate::types::ResourceKind;

/// A listener managed through the panel's forms.
///
/// Nested sections are stored as independent JSON text blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub remark: String,
    pub enable: bool,
    #[serde(default)]
    pub listen: String,
    pub port: u16,
    pub protocol: String,
    pub tag: String,
    #[serde(default)]
    pub settings: String,
    #[serde(default)]
    pub stream_settings: String,
    #[serde(default)]
    pub sniffing: String,
}

impl Inbound {
    /// Render the record as an `inbounds` document entry.
    pub fn to_entry(&self) -> Result<Value, serde_json::Error> {
        let mut entry = Map::new();
        entry.insert("tag".to_string(), Value::from(self.tag.clone()));
        entry.insert("protocol".to_string(), Value::from(self.protocol.clone()));
        entry.insert("port".to_string(), Value::from(self.port));
        if !self.listen.is_empty() {
            entry.insert("listen".to_string(), Value::from(self.listen.clone()));
        }
        insert_section(&mut entry, "settings", &self.settings)?;
        insert_section(&mut entry, "streamSettings", &self.stream_settings)?;
        insert_section(&mut entry, "sniffing", &self.sniffing)?;
        Ok(Value::Object(entry))
    }
}

impl ManagedRecord for Inbound {
    const KIND: ResourceKind = ResourceKind::Inbound;

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

    fn sample() -> Inbound {
        Inbound {
            id: Some(3),
            remark: "edge".to_string(),
            enable: true,
            listen: String::new(),
            port: 23456,
            protocol: "vmess".to_string(),
            tag: "managed-in".to_string(),
            settings: r#"{"clients":[]}"#.to_string(),
            stream_settings: "{}".to_string(),
            sniffing: String::new(),
        }
    }

    #[test]
    fn to_entry_parses_sections_and_omits_empty_fields() {
        let entry = sample().to_entry().unwrap();

        assert_eq!(
            entry,
            json!({
                "tag": "managed-in",
                "protocol": "vmess",
                "port": 23456,
                "settings": {"clients": []},
                "streamSettings": {}
            })
        );
    }

    #[test]
    fn to_entry_includes_listen_when_set() {
        let mut inbound = sample();
        inbound.listen = "0.0.0.0".to_string();

        let entry = inbound.to_entry().unwrap();
        assert_eq!(entry["listen"], json!("0.0.0.0"));
    }

    #[test]
    fn to_entry_fails_on_corrupt_section() {
        let mut inbound = sample();
        inbound.sniffing = "{not json".to_string();

        assert!(inbound.to_entry().is_err());
    }
}
