//! Config format detection and parsing.
//!
//! Formats are detected from the filename suffix; content is parsed into a
//! dynamic [`ConfigValue`] tree. A process-wide custom-parser registry is
//! consulted before the built-ins, so embedders can override or extend the
//! format set. The registry is append-only and should be populated before
//! the first watch starts.
//!
//! Parse errors carry format and position context only, never the raw
//! input bytes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::{Result, WatchError};

/// Recognized configuration formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
    Hcl,
    Ini,
    Properties,
    Unknown,
}

impl ConfigFormat {
    fn name(self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Hcl => "hcl",
            ConfigFormat::Ini => "ini",
            ConfigFormat::Properties => "properties",
            ConfigFormat::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Detect the format from a filename suffix, case-insensitively.
pub fn detect_format(path: &str) -> ConfigFormat {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "json" => ConfigFormat::Json,
        "yaml" | "yml" => ConfigFormat::Yaml,
        "toml" => ConfigFormat::Toml,
        "hcl" | "tf" => ConfigFormat::Hcl,
        "ini" | "conf" | "cfg" | "config" => ConfigFormat::Ini,
        "properties" => ConfigFormat::Properties,
        _ => ConfigFormat::Unknown,
    }
}

/// Dynamic configuration value.
///
/// `Null` exists because JSON/YAML/HCL documents carry explicit nulls;
/// scalars are otherwise bool, 64-bit int, 64-bit float, and string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert into a `serde_json::Value` (used by the config writer and
    /// the audit trail).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConfigValue::Null => serde_json::Value::Null,
            ConfigValue::Bool(b) => serde_json::Value::Bool(*b),
            ConfigValue::Int(i) => serde_json::Value::from(*i),
            ConfigValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ConfigValue::String(s) => serde_json::Value::String(s.clone()),
            ConfigValue::List(items) => {
                serde_json::Value::Array(items.iter().map(ConfigValue::to_json).collect())
            }
            ConfigValue::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// A user-supplied parser. Registered parsers are queried before built-ins.
pub trait ConfigParser: Send + Sync {
    /// Identifier used in diagnostics
    fn name(&self) -> &str;
    /// Whether this parser handles `format`
    fn supports(&self, format: ConfigFormat) -> bool;
    /// Parse raw bytes into a top-level key/value map
    fn parse(&self, input: &[u8]) -> Result<HashMap<String, ConfigValue>>;
}

/// Process-wide registry. Append-only by convention: populate at startup,
/// before the first watch runs.
static CUSTOM_PARSERS: Lazy<RwLock<Vec<Arc<dyn ConfigParser>>>> =
    Lazy::new(|| RwLock::new(Vec::new()));

/// Register a custom parser. Later registrations take precedence over
/// earlier ones for the formats they support.
pub fn register_parser(parser: Arc<dyn ConfigParser>) {
    CUSTOM_PARSERS.write().unwrap().push(parser);
}

/// Number of registered custom parsers.
pub fn registered_parser_count() -> usize {
    CUSTOM_PARSERS.read().unwrap().len()
}

/// Parse raw config bytes in the given format.
///
/// The custom registry is queried first (most recent registration wins),
/// falling back to the built-in parser for the format. `Unknown` without a
/// custom parser is an error.
pub fn parse_config(input: &[u8], format: ConfigFormat) -> Result<HashMap<String, ConfigValue>> {
    {
        let registry = CUSTOM_PARSERS.read().unwrap();
        if let Some(parser) = registry.iter().rev().find(|p| p.supports(format)) {
            return parser.parse(input);
        }
    }

    match format {
        ConfigFormat::Json => parse_json(input),
        ConfigFormat::Yaml => parse_yaml(input),
        ConfigFormat::Toml => parse_toml(input),
        ConfigFormat::Hcl => parse_hcl(input),
        ConfigFormat::Ini => parse_ini(input),
        ConfigFormat::Properties => parse_properties(input),
        ConfigFormat::Unknown => Err(WatchError::Parse {
            format: "unknown",
            message: "no parser registered for this file suffix".to_string(),
        }),
    }
}

fn utf8<'a>(input: &'a [u8], format: &'static str) -> Result<&'a str> {
    std::str::from_utf8(input).map_err(|e| WatchError::Parse {
        format,
        message: format!("input is not valid UTF-8 at byte {}", e.valid_up_to()),
    })
}

fn parse_json(input: &[u8]) -> Result<HashMap<String, ConfigValue>> {
    let value: serde_json::Value =
        serde_json::from_slice(input).map_err(|e| WatchError::Parse {
            format: "json",
            // serde_json errors carry line/column, not input text
            message: e.to_string(),
        })?;
    match value {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, from_json(v)))
            .collect()),
        _ => Err(top_level_error("json")),
    }
}

fn from_json(value: serde_json::Value) -> ConfigValue {
    match value {
        serde_json::Value::Null => ConfigValue::Null,
        serde_json::Value::Bool(b) => ConfigValue::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ConfigValue::Int(i)
            } else {
                ConfigValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => ConfigValue::String(s),
        serde_json::Value::Array(items) => {
            ConfigValue::List(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(map) => ConfigValue::Map(
            map.into_iter().map(|(k, v)| (k, from_json(v))).collect(),
        ),
    }
}

fn parse_yaml(input: &[u8]) -> Result<HashMap<String, ConfigValue>> {
    let value: serde_yaml::Value =
        serde_yaml::from_slice(input).map_err(|e| WatchError::Parse {
            format: "yaml",
            message: e
                .location()
                .map(|l| format!("invalid YAML at line {} column {}", l.line(), l.column()))
                .unwrap_or_else(|| "invalid YAML document".to_string()),
        })?;
    match value {
        serde_yaml::Value::Mapping(map) => {
            let mut out = HashMap::with_capacity(map.len());
            for (key, val) in map {
                out.insert(yaml_key(&key), from_yaml(val));
            }
            Ok(out)
        }
        serde_yaml::Value::Null => Ok(HashMap::new()),
        _ => Err(top_level_error("yaml")),
    }
}

fn yaml_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        _ => String::from("~"),
    }
}

fn from_yaml(value: serde_yaml::Value) -> ConfigValue {
    match value {
        serde_yaml::Value::Null => ConfigValue::Null,
        serde_yaml::Value::Bool(b) => ConfigValue::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ConfigValue::Int(i)
            } else {
                ConfigValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_yaml::Value::String(s) => ConfigValue::String(s),
        serde_yaml::Value::Sequence(items) => {
            ConfigValue::List(items.into_iter().map(from_yaml).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = HashMap::with_capacity(map.len());
            for (key, val) in map {
                out.insert(yaml_key(&key), from_yaml(val));
            }
            ConfigValue::Map(out)
        }
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value),
    }
}

fn parse_toml(input: &[u8]) -> Result<HashMap<String, ConfigValue>> {
    let text = utf8(input, "toml")?;
    let table: toml::Table = toml::from_str(text).map_err(|e| WatchError::Parse {
        format: "toml",
        // message() omits the rendered source snippet
        message: e.message().to_string(),
    })?;
    Ok(table
        .into_iter()
        .map(|(k, v)| (k, from_toml(v)))
        .collect())
}

fn from_toml(value: toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::String(s),
        toml::Value::Integer(i) => ConfigValue::Int(i),
        toml::Value::Float(f) => ConfigValue::Float(f),
        toml::Value::Boolean(b) => ConfigValue::Bool(b),
        toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        toml::Value::Array(items) => {
            ConfigValue::List(items.into_iter().map(from_toml).collect())
        }
        toml::Value::Table(table) => ConfigValue::Map(
            table.into_iter().map(|(k, v)| (k, from_toml(v))).collect(),
        ),
    }
}

fn parse_hcl(input: &[u8]) -> Result<HashMap<String, ConfigValue>> {
    let text = utf8(input, "hcl")?;
    let value: hcl::Value = hcl::from_str(text).map_err(|_| WatchError::Parse {
        format: "hcl",
        // hcl errors can quote the offending expression; keep it generic
        message: "invalid HCL document".to_string(),
    })?;
    match value {
        hcl::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, from_hcl(v)))
            .collect()),
        _ => Err(top_level_error("hcl")),
    }
}

fn from_hcl(value: hcl::Value) -> ConfigValue {
    match value {
        hcl::Value::Null => ConfigValue::Null,
        hcl::Value::Bool(b) => ConfigValue::Bool(b),
        hcl::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ConfigValue::Int(i)
            } else {
                ConfigValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        hcl::Value::String(s) => ConfigValue::String(s),
        hcl::Value::Array(items) => {
            ConfigValue::List(items.into_iter().map(from_hcl).collect())
        }
        hcl::Value::Object(map) => ConfigValue::Map(
            map.into_iter().map(|(k, v)| (k, from_hcl(v))).collect(),
        ),
    }
}

fn top_level_error(format: &'static str) -> WatchError {
    WatchError::Parse {
        format,
        message: "top-level value must be a map".to_string(),
    }
}

/// Line-based INI parser. `[section]` headers prefix subsequent keys with
/// `section.`; `#` and `;` start comments; `=` and `:` separate keys from
/// values. Scalar values are type-inferred (bool, int, float, string).
fn parse_ini(input: &[u8]) -> Result<HashMap<String, ConfigValue>> {
    let text = utf8(input, "ini")?;
    let mut out = HashMap::new();
    let mut section = String::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = header.trim().to_string();
            continue;
        }
        let split = line
            .find(['=', ':'])
            .ok_or_else(|| WatchError::Parse {
                format: "ini",
                message: format!("missing key separator at line {}", index + 1),
            })?;
        let key = line[..split].trim();
        if key.is_empty() {
            return Err(WatchError::Parse {
                format: "ini",
                message: format!("empty key at line {}", index + 1),
            });
        }
        let value = line[split + 1..].trim();
        let full_key = if section.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", section, key)
        };
        out.insert(full_key, infer_scalar(value));
    }

    Ok(out)
}

/// Line-based Java-properties parser. `#` and `!` start comments; the first
/// of `=`, `:` or whitespace separates key from value.
fn parse_properties(input: &[u8]) -> Result<HashMap<String, ConfigValue>> {
    let text = utf8(input, "properties")?;
    let mut out = HashMap::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let split = line
            .find(['=', ':'])
            .or_else(|| line.find(char::is_whitespace));
        let (key, value) = match split {
            Some(at) => (line[..at].trim(), line[at + 1..].trim()),
            // A bare key is a key with an empty value
            None => (line, ""),
        };
        if key.is_empty() {
            continue;
        }
        out.insert(key.to_string(), infer_scalar(value));
    }

    Ok(out)
}

/// Type inference for line-based formats: bool, then i64, then f64, else
/// string with a matching surrounding quote pair stripped.
fn infer_scalar(raw: &str) -> ConfigValue {
    match raw {
        "true" | "True" | "TRUE" => return ConfigValue::Bool(true),
        "false" | "False" | "FALSE" => return ConfigValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return ConfigValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return ConfigValue::Float(f);
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        .unwrap_or(raw);
    ConfigValue::String(unquoted.to_string())
}
