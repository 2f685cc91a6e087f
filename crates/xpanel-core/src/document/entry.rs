//! Borrowed views over single `inbounds`/`outbounds` entries.

use serde_json::{Map, Value};

/// Presence of one key in an entry.
///
/// Keeps "key absent" apart from "key present with null", which the record
/// builder treats differently for `listen`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Absent,
    Null,
    Present(&'a Value),
}

impl<'a> Field<'a> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// The non-null value, if any.
    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Field::Present(value) => Some(value),
            Field::Absent | Field::Null => None,
        }
    }
}

/// A single object from the `inbounds` or `outbounds` sequence.
#[derive(Debug, Clone, Copy)]
pub struct ConfigEntry<'a> {
    object: &'a Map<String, Value>,
}

impl<'a> ConfigEntry<'a> {
    /// View a JSON value as an entry; `None` unless it is an object.
    pub fn from_value(value: &'a Value) -> Option<Self> {
        value.as_object().map(|object| Self { object })
    }

    pub fn field(&self, name: &str) -> Field<'a> {
        match self.object.get(name) {
            None => Field::Absent,
            Some(Value::Null) => Field::Null,
            Some(value) => Field::Present(value),
        }
    }

    /// Whether the key is present at all, null included.
    pub fn has(&self, name: &str) -> bool {
        self.object.contains_key(name)
    }

    /// Identity tag; empty when absent or not a string.
    pub fn tag(&self) -> &'a str {
        self.object
            .get("tag")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn protocol(&self) -> Option<&'a str> {
        self.object.get("protocol").and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.object.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_distinguishes_absent_from_null() {
        let value = json!({"listen": null, "port": 443});
        let entry = ConfigEntry::from_value(&value).unwrap();

        assert_eq!(entry.field("listen"), Field::Null);
        assert_eq!(entry.field("missing"), Field::Absent);
        assert_eq!(entry.field("port").value(), Some(&json!(443)));
        assert!(entry.has("listen"));
        assert!(!entry.has("missing"));
    }

    #[test]
    fn non_string_tag_reads_as_empty() {
        let value = json!({"tag": 7, "protocol": "vmess"});
        let entry = ConfigEntry::from_value(&value).unwrap();

        assert_eq!(entry.tag(), "");
        assert_eq!(entry.protocol(), Some("vmess"));
    }

    #[test]
    fn non_object_values_are_not_entries() {
        assert!(ConfigEntry::from_value(&json!("inbound")).is_none());
        assert!(ConfigEntry::from_value(&json!([])).is_none());
    }
}
