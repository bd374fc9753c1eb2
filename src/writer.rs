//! Atomic config writes.
//!
//! Serializes a value map in the requested format, writes it to a sibling
//! temporary file, syncs, and renames over the destination so that readers
//! (including the watcher's own polling loop) only ever observe a complete
//! document. Not on the watch hot path.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, WatchError};
use crate::parser::{ConfigFormat, ConfigValue};
use crate::validation;

/// Serialize `values` and atomically replace the file at `path`.
///
/// The destination path goes through the same security validation as watch
/// registration. The temporary file is created in the destination's
/// directory so the final rename never crosses a filesystem boundary.
pub fn write_config_atomic(
    path: &str,
    values: &HashMap<String, ConfigValue>,
    format: ConfigFormat,
) -> Result<()> {
    validation::validate(path).map_err(|rejection| WatchError::UnsafePath {
        path: path.to_string(),
        rejection,
    })?;

    let bytes = serialize_config(values, format)?;

    let destination = Path::new(path);
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| WatchError::Io {
        path: path.to_string(),
        source: e,
    })?;
    temp.write_all(&bytes).map_err(|e| WatchError::Io {
        path: path.to_string(),
        source: e,
    })?;
    temp.as_file().sync_all().map_err(|e| WatchError::Io {
        path: path.to_string(),
        source: e,
    })?;
    temp.persist(destination).map_err(|e| WatchError::Io {
        path: path.to_string(),
        source: e.error,
    })?;
    Ok(())
}

/// Serialize a value map in the given format.
pub fn serialize_config(
    values: &HashMap<String, ConfigValue>,
    format: ConfigFormat,
) -> Result<Vec<u8>> {
    let json = ConfigValue::Map(values.clone()).to_json();
    match format {
        ConfigFormat::Json => {
            let mut bytes = serde_json::to_vec_pretty(&json).map_err(|e| WatchError::Parse {
                format: "json",
                message: e.to_string(),
            })?;
            bytes.push(b'\n');
            Ok(bytes)
        }
        ConfigFormat::Yaml => serde_yaml::to_string(&json)
            .map(String::into_bytes)
            .map_err(|e| WatchError::Parse {
                format: "yaml",
                message: e.to_string(),
            }),
        ConfigFormat::Toml => toml::to_string_pretty(&json)
            .map(String::into_bytes)
            .map_err(|e| WatchError::Parse {
                format: "toml",
                message: e.to_string(),
            }),
        ConfigFormat::Hcl => hcl::to_string(&json)
            .map(String::into_bytes)
            .map_err(|_| WatchError::Parse {
                format: "hcl",
                message: "value map is not representable as HCL".to_string(),
            }),
        ConfigFormat::Ini => write_lines(values, true),
        ConfigFormat::Properties => write_lines(values, false),
        ConfigFormat::Unknown => Err(WatchError::Parse {
            format: "unknown",
            message: "cannot serialize to an unknown format".to_string(),
        }),
    }
}

/// Line writer for INI and Properties. Top-level scalars become `key=value`
/// lines; for INI, one level of maps becomes `[section]` blocks. Deeper
/// nesting is not representable in these formats.
fn write_lines(values: &HashMap<String, ConfigValue>, sections: bool) -> Result<Vec<u8>> {
    let format: &'static str = if sections { "ini" } else { "properties" };
    let mut scalars: Vec<(&String, String)> = Vec::new();
    let mut maps: Vec<(&String, &HashMap<String, ConfigValue>)> = Vec::new();

    for (key, value) in values {
        match value {
            ConfigValue::Map(inner) if sections => maps.push((key, inner)),
            other => scalars.push((key, scalar_text(other, format)?)),
        }
    }
    // Deterministic output regardless of map iteration order
    scalars.sort_by(|a, b| a.0.cmp(b.0));
    maps.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    for (key, text) in scalars {
        out.push_str(key);
        out.push('=');
        out.push_str(&text);
        out.push('\n');
    }
    for (section, inner) in maps {
        out.push('\n');
        out.push('[');
        out.push_str(section);
        out.push_str("]\n");
        let mut entries: Vec<(&String, String)> = Vec::new();
        for (key, value) in inner {
            entries.push((key, scalar_text(value, format)?));
        }
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (key, text) in entries {
            out.push_str(key);
            out.push('=');
            out.push_str(&text);
            out.push('\n');
        }
    }
    Ok(out.into_bytes())
}

fn scalar_text(value: &ConfigValue, format: &'static str) -> Result<String> {
    match value {
        ConfigValue::Null => Ok(String::new()),
        ConfigValue::Bool(b) => Ok(b.to_string()),
        ConfigValue::Int(i) => Ok(i.to_string()),
        ConfigValue::Float(f) => Ok(f.to_string()),
        ConfigValue::String(s) => Ok(s.clone()),
        ConfigValue::List(_) | ConfigValue::Map(_) => Err(WatchError::Parse {
            format,
            message: "nested containers are not representable in this format".to_string(),
        }),
    }
}
