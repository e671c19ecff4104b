//! Tolerant field readers for the JSONB configuration views
//!
//! A `null` or wrongly shaped field reads as empty so the remaining fields
//! of the same blob survive.

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

/// A list of strings; a lone string is a one-element list
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => vec![s],
        Value::Array(items) => items.into_iter().filter_map(text).collect(),
        _ => Vec::new(),
    })
}

/// A string, or `None` for anything else
pub fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text(Value::deserialize(deserializer)?))
}

/// A list of `T`, skipping elements that do not parse
pub fn list_of<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}
