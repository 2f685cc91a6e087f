//! Builds managed records from document entries.
//!
//! A builder starts from the existing record for the tag (so surrogate
//! identity and fields the document does not carry survive) or from a fresh
//! enabled record, then overwrites every engine-visible field from the entry.

use serde_json::Value;
use thiserror::Error;

use crate::document::{ConfigEntry, Field, json_type_name};
use crate::model::{Inbound, Outbound};

/// An entry could not be turned into a record.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid port value: {value}")]
    InvalidPort { value: String },

    #[error("Port out of range: {value}")]
    PortOutOfRange { value: String },

    #[error("Field '{field}' must be a {expected}, found {found}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Field '{field}' is not valid JSON: {source}")]
    InvalidSection {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Field '{field}' is required")]
    Missing { field: &'static str },
}

/// Coerce a port value.
///
/// Integral numbers and numeric strings are accepted; a blank string, null
/// or a missing key yields 0.
pub fn parse_port(field: Field<'_>) -> Result<u16, BuildError> {
    let Some(value) = field.value() else {
        return Ok(0);
    };
    match value {
        Value::Number(number) => {
            if let Some(port) = number.as_i64() {
                port_in_range(port, || number.to_string())
            } else if number.as_u64().is_some() {
                Err(BuildError::PortOutOfRange {
                    value: number.to_string(),
                })
            } else {
                Err(BuildError::InvalidPort {
                    value: number.to_string(),
                })
            }
        }
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(0);
            }
            let port: i64 = text.parse().map_err(|_| BuildError::InvalidPort {
                value: text.to_string(),
            })?;
            port_in_range(port, || text.to_string())
        }
        other => Err(BuildError::InvalidField {
            field: "port",
            expected: "number or numeric string",
            found: json_type_name(other),
        }),
    }
}

fn port_in_range(port: i64, text: impl FnOnce() -> String) -> Result<u16, BuildError> {
    u16::try_from(port).map_err(|_| BuildError::PortOutOfRange { value: text() })
}

/// Serialize a nested section into its stored text form.
///
/// Strings are taken as already-serialized JSON and kept verbatim; blank
/// strings, null and a missing key become empty text.
pub fn marshal_section(name: &'static str, field: Field<'_>) -> Result<String, BuildError> {
    let Some(value) = field.value() else {
        return Ok(String::new());
    };
    match value {
        Value::String(text) => {
            if text.trim().is_empty() {
                return Ok(String::new());
            }
            serde_json::from_str::<Value>(text)
                .map_err(|source| BuildError::InvalidSection { field: name, source })?;
            Ok(text.clone())
        }
        other => serde_json::to_string_pretty(other)
            .map_err(|source| BuildError::InvalidSection { field: name, source }),
    }
}

/// Keep a non-blank remark, otherwise fall back to the tag.
pub fn default_remark(current: &str, tag: &str) -> String {
    if current.trim().is_empty() {
        tag.to_string()
    } else {
        current.to_string()
    }
}

fn string_value<'a>(field: Field<'a>, name: &'static str) -> Result<Option<&'a str>, BuildError> {
    match field.value() {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.as_str())),
        Some(other) => Err(BuildError::InvalidField {
            field: name,
            expected: "string",
            found: json_type_name(other),
        }),
    }
}

/// Build an inbound record from a managed entry.
pub fn build_inbound(
    entry: &ConfigEntry<'_>,
    existing: Option<&Inbound>,
) -> Result<Inbound, BuildError> {
    let mut inbound = existing.cloned().unwrap_or_default();
    inbound.enable = true;
    inbound.tag = entry.tag().to_string();

    let listen = entry.field("listen");
    if !listen.is_absent() {
        inbound.listen = string_value(listen, "listen")?
            .unwrap_or_default()
            .to_string();
    }

    inbound.port = parse_port(entry.field("port"))?;
    if let Some(protocol) = string_value(entry.field("protocol"), "protocol")? {
        inbound.protocol = protocol.to_string();
    }

    inbound.settings = marshal_section("settings", entry.field("settings"))?;
    inbound.stream_settings = marshal_section("streamSettings", entry.field("streamSettings"))?;
    inbound.sniffing = marshal_section("sniffing", entry.field("sniffing"))?;
    inbound.remark = default_remark(&inbound.remark, &inbound.tag);

    if inbound.port == 0 {
        return Err(BuildError::Missing { field: "port" });
    }
    if inbound.protocol.is_empty() {
        return Err(BuildError::Missing { field: "protocol" });
    }
    Ok(inbound)
}

/// Build an outbound record from a managed entry.
///
/// `now` is stamped into `created_at` for new records and into `updated_at`
/// whenever the record differs from `existing`.
pub fn build_outbound(
    entry: &ConfigEntry<'_>,
    existing: Option<&Outbound>,
    now: i64,
) -> Result<Outbound, BuildError> {
    let mut outbound = match existing {
        Some(existing) => existing.clone(),
        None => Outbound {
            created_at: now,
            ..Default::default()
        },
    };
    outbound.enable = true;
    outbound.tag = entry.tag().to_string();

    if let Some(protocol) = string_value(entry.field("protocol"), "protocol")? {
        outbound.protocol = protocol.to_string();
    }

    outbound.settings = marshal_section("settings", entry.field("settings"))?;
    outbound.stream_settings = marshal_section("streamSettings", entry.field("streamSettings"))?;
    outbound.proxy_settings = marshal_section("proxySettings", entry.field("proxySettings"))?;
    outbound.mux = marshal_section("mux", entry.field("mux"))?;
    outbound.remark = default_remark(&outbound.remark, &outbound.tag);

    if outbound.protocol.is_empty() {
        return Err(BuildError::Missing { field: "protocol" });
    }
    if existing.is_none_or(|existing| *existing != outbound) {
        outbound.updated_at = now;
    }
    Ok(outbound)
}
