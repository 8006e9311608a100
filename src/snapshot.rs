use crate::{
    error::DeckError,
    plugin::{PluginRecord, RawPlugin, PLUGIN_TYPE_TAG},
};
use anyhow::{Context, Result};
use serde_json::Value;
use std::{fs, path::Path};

const TYPE_KEY: &str = "__type";

/// A load order as exported by the sorting engine.
#[derive(Debug, Clone)]
pub struct GameSnapshot {
    pub title: Option<String>,
    pub plugins: Vec<PluginRecord>,
}

impl GameSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read snapshot {}", path.display()))?;
        let snapshot = Self::parse(&raw)
            .with_context(|| format!("parse snapshot {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            plugins = snapshot.plugins.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn parse(raw: &str) -> Result<Self, DeckError> {
        let value: Value = serde_json::from_str(raw).map_err(DeckError::InvalidSnapshot)?;
        let title = value
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        let plugins = revive_plugins(value)?;
        Ok(Self { title, plugins })
    }
}

/// Turns every object tagged `"__type": "Plugin"` into a record, in document
/// order. Untagged objects are searched for nested plugins.
pub fn revive_plugins(value: Value) -> Result<Vec<PluginRecord>, DeckError> {
    let mut plugins = Vec::new();
    collect(value, &mut plugins)?;
    Ok(plugins)
}

fn collect(value: Value, out: &mut Vec<PluginRecord>) -> Result<(), DeckError> {
    match value {
        Value::Array(items) => {
            for item in items {
                collect(item, out)?;
            }
        }
        Value::Object(map) => {
            let tagged = map.get(TYPE_KEY).and_then(Value::as_str) == Some(PLUGIN_TYPE_TAG);
            if tagged {
                let index = out.len();
                let raw: RawPlugin = serde_json::from_value(Value::Object(map))?;
                let name = match raw.name.clone() {
                    Some(name) if !name.is_empty() => name,
                    _ => return Err(DeckError::MissingPluginName { index }),
                };
                out.push(PluginRecord::new(name, raw));
            } else {
                for (_, child) in map {
                    collect(child, out)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}
