//! Tolerant deserializers for fields the language model fills loosely.
//!
//! Generated JSON regularly puts numbers where strings belong, a single
//! string where a list belongs, or a list where a map belongs. These
//! helpers coerce the common shapes and fall back to the field default
//! for anything else.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Accept a string, number or bool as text; anything else is empty.
pub(crate) fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(_) | Value::Object(_) => String::new(),
        other => value_to_text(&other),
    })
}

/// Accept a list of scalars or a single non-empty string.
pub(crate) fn list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// Accept an object of scalars, or a list of `"key: value"` strings.
pub(crate) fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(entries) => entries
            .iter()
            .map(|(k, v)| (k.clone(), value_to_text(v)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.trim().is_empty())
            .map(|entry| match entry.split_once(['：', ':']) {
                Some((key, rest)) => (key.trim().to_string(), rest.trim().to_string()),
                None => (entry.trim().to_string(), String::new()),
            })
            .collect(),
        _ => BTreeMap::new(),
    })
}

/// Accept a non-negative count as a number or numeric string.
pub(crate) fn count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Number(n) => n.as_f64().map(|v| v.max(0.0) as u32).unwrap_or(0),
        Value::String(s) => s.trim().parse::<u32>().unwrap_or(0),
        _ => 0,
    })
}

/// Accept an importance as a number or numeric string, clamped to 1..=10.
pub(crate) fn importance<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let raw = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw
        .map(|v| v.round().clamp(1.0, 10.0) as u8)
        .unwrap_or(super::DEFAULT_IMPORTANCE))
}
