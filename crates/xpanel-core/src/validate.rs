//! Proxy-engine config validation.
//!
//! A merged template must still be loadable by the engine before it is
//! persisted. [`EngineValidator`] checks the structural contract the engine
//! relies on; it does not check protocol-specific settings.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::json_type_name;

/// The document would not load as a proxy-engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Proxy engine config invalid: {message}")]
pub struct ConfigInvalid {
    pub message: String,
}

impl ConfigInvalid {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Checks that document text is an acceptable engine configuration.
pub trait ConfigValidator: Send + Sync {
    fn validate(&self, document: &str) -> Result<(), ConfigInvalid>;
}

/// Structural validator for the engine's JSON configuration format.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineValidator;

// Fields that are never read are still type-checked by deserialization.
#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct EngineConfig {
    #[serde(default)]
    log: Option<Map<String, Value>>,
    #[serde(default)]
    routing: Option<Map<String, Value>>,
    #[serde(default)]
    dns: Option<Map<String, Value>>,
    #[serde(default)]
    policy: Option<Map<String, Value>>,
    #[serde(default)]
    api: Option<Map<String, Value>>,
    #[serde(default)]
    inbounds: Option<Vec<InboundConfig>>,
    #[serde(default)]
    outbounds: Option<Vec<OutboundConfig>>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundConfig {
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    port: Option<Value>,
    #[serde(default)]
    settings: Option<Value>,
    #[serde(default)]
    stream_settings: Option<Value>,
    #[serde(default)]
    sniffing: Option<Value>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutboundConfig {
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    settings: Option<Value>,
    #[serde(default)]
    stream_settings: Option<Value>,
    #[serde(default)]
    proxy_settings: Option<Value>,
    #[serde(default)]
    mux: Option<Value>,
}

impl ConfigValidator for EngineValidator {
    fn validate(&self, document: &str) -> Result<(), ConfigInvalid> {
        if document.trim().is_empty() {
            return Ok(());
        }
        let config: EngineConfig =
            serde_json::from_str(document).map_err(|err| ConfigInvalid::new(err.to_string()))?;
        config.check()
    }
}

impl EngineConfig {
    fn check(&self) -> Result<(), ConfigInvalid> {
        for (index, inbound) in self.inbounds.iter().flatten().enumerate() {
            let path = format!("inbounds[{index}]");
            check_port(&path, inbound.port.as_ref())?;
            for (name, section) in [
                ("settings", &inbound.settings),
                ("streamSettings", &inbound.stream_settings),
                ("sniffing", &inbound.sniffing),
            ] {
                check_section(&path, name, section.as_ref())?;
            }
        }

        for (index, outbound) in self.outbounds.iter().flatten().enumerate() {
            let path = format!("outbounds[{index}]");
            for (name, section) in [
                ("settings", &outbound.settings),
                ("streamSettings", &outbound.stream_settings),
                ("proxySettings", &outbound.proxy_settings),
                ("mux", &outbound.mux),
            ] {
                check_section(&path, name, section.as_ref())?;
            }
        }
        Ok(())
    }
}

/// Ports are integers or strings; the engine reads strings as ranges
/// (`"1000-2000"`) or lists.
fn check_port(path: &str, port: Option<&Value>) -> Result<(), ConfigInvalid> {
    match port {
        None | Some(Value::String(_)) => Ok(()),
        Some(Value::Number(number)) if number.as_u64().is_some() => Ok(()),
        Some(other) => Err(ConfigInvalid::new(format!(
            "{path}.port must be an integer or string, found {}",
            describe(other)
        ))),
    }
}

fn check_section(path: &str, name: &str, section: Option<&Value>) -> Result<(), ConfigInvalid> {
    match section {
        None | Some(Value::Object(_)) => Ok(()),
        Some(other) => Err(ConfigInvalid::new(format!(
            "{path}.{name} must be an object, found {}",
            json_type_name(other)
        ))),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Number(number) => format!("number {number}"),
        other => json_type_name(other).to_string(),
    }
}
