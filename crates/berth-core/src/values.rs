//! Values handling with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Values container with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from YAML string
    ///
    /// An empty document yields empty values rather than `null`.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(_) => Ok(Self(value)),
            other => Err(CoreError::ValuesMerge {
                message: format!("values document must be a mapping, got {}", type_name(&other)),
            }),
        }
    }

    /// Parse values from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Serialize to YAML.
    ///
    /// Map keys are emitted in sorted order, so equal values always produce
    /// byte-identical output.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&sorted_yaml(&self.0))?)
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Merge multiple values in order, later layers winning
    pub fn merge_all(values: impl IntoIterator<Item = Values>) -> Self {
        let mut result = Values::new();
        for v in values {
            result.merge(&v);
        }
        result
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::ValuesMerge {
                message: format!("invalid key path '{}'", path),
            });
        }
        set_nested(&mut self.0, &parts, value);
        Ok(())
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}

/// Convert to a YAML tree with mapping keys in lexical order
fn sorted_yaml(value: &JsonValue) -> serde_yaml::Value {
    match value {
        JsonValue::Null => serde_yaml::Value::Null,
        JsonValue::Bool(b) => serde_yaml::Value::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_yaml::Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                serde_yaml::Value::Number(u.into())
            } else {
                serde_yaml::Value::Number(n.as_f64().unwrap_or_default().into())
            }
        }
        JsonValue::String(s) => serde_yaml::Value::String(s.clone()),
        JsonValue::Array(items) => {
            serde_yaml::Value::Sequence(items.iter().map(sorted_yaml).collect())
        }
        JsonValue::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut mapping = serde_yaml::Mapping::with_capacity(entries.len());
            for (key, value) in entries {
                mapping.insert(serde_yaml::Value::String(key.clone()), sorted_yaml(value));
            }
            serde_yaml::Value::Mapping(mapping)
        }
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Set a nested value by path, replacing non-object intermediates
fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    if let JsonValue::Object(map) = value {
        let entry = map
            .entry((*key).to_string())
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
        set_nested(entry, remaining, new_value);
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

fn split_assignment(arg: &str, flag: &str) -> Result<(String, String)> {
    let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::ValuesMerge {
        message: format!("Invalid {} format: '{}'. Expected key=value", flag, arg),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CoreError::ValuesMerge {
            message: format!("Invalid {} format: '{}'. Key is empty", flag, arg),
        });
    }
    Ok((key.to_string(), val.to_string()))
}

/// Parse --set arguments (key=value format)
///
/// Values are typed: booleans, `null`, integers, floats and inline JSON
/// lists/objects are recognized, anything else stays a string.
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = split_assignment(arg, "--set")?;

        let json_value = if val == "true" {
            JsonValue::Bool(true)
        } else if val == "false" {
            JsonValue::Bool(false)
        } else if val == "null" {
            JsonValue::Null
        } else if let Ok(num) = val.parse::<i64>() {
            JsonValue::Number(num.into())
        } else if let Some(num) = val
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            JsonValue::Number(num)
        } else if val.starts_with('[') || val.starts_with('{') {
            serde_json::from_str(&val).unwrap_or(JsonValue::String(val))
        } else {
            JsonValue::String(val)
        };

        values.set(&key, json_value)?;
    }

    Ok(values)
}

/// Parse --set-string arguments; every value is kept as a string
pub fn parse_set_string_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = split_assignment(arg, "--set-string")?;
        values.set(&key, JsonValue::String(val))?;
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_yaml(
            r#"
image:
  repository: nginx
  tag: "1.0"
replicas: 1
"#,
        )
        .unwrap();

        let overlay = Values::from_yaml(
            r#"
image:
  tag: "2.0"
  pullPolicy: Always
replicas: 3
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("image.repository").unwrap(), "nginx");
        assert_eq!(base.get("image.tag").unwrap(), "2.0");
        assert_eq!(base.get("image.pullPolicy").unwrap(), "Always");
        assert_eq!(base.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_merge_replaces_arrays() {
        let mut base = Values::from_yaml("hosts: [a, b, c]").unwrap();
        base.merge(&Values::from_yaml("hosts: [d]").unwrap());
        assert_eq!(base.get("hosts").unwrap(), &serde_json::json!(["d"]));
    }

    #[test]
    fn test_merge_all_order() {
        let merged = Values::merge_all([
            Values::from_yaml("x: 1").unwrap(),
            Values::from_yaml("x: 2\ny: 2").unwrap(),
            Values::from_yaml("x: 3").unwrap(),
        ]);
        assert_eq!(merged.get("x").unwrap(), 3);
        assert_eq!(merged.get("y").unwrap(), 2);
    }

    #[test]
    fn test_from_yaml_empty_document() {
        let values = Values::from_yaml("").unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_from_yaml_rejects_scalar() {
        assert!(Values::from_yaml("just a string").is_err());
    }

    #[test]
    fn test_set_nested() {
        let mut values = Values::new();
        values.set("image.tag", JsonValue::String("v1".into())).unwrap();
        values.set("replicas", JsonValue::Number(3.into())).unwrap();

        assert_eq!(values.get("image.tag").unwrap(), "v1");
        assert_eq!(values.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_set_rejects_empty_segment() {
        let mut values = Values::new();
        assert!(values.set("image..tag", JsonValue::Null).is_err());
    }

    #[test]
    fn test_parse_set_values() {
        let args = vec![
            "image.tag=v2".to_string(),
            "replicas=5".to_string(),
            "debug=true".to_string(),
            "ratio=0.5".to_string(),
        ];

        let values = parse_set_values(&args).unwrap();

        assert_eq!(values.get("image.tag").unwrap(), "v2");
        assert_eq!(values.get("replicas").unwrap(), 5);
        assert_eq!(values.get("debug").unwrap(), true);
        assert_eq!(values.get("ratio").unwrap(), 0.5);
    }

    #[test]
    fn test_parse_set_values_missing_equals() {
        let err = parse_set_values(&["replicas".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Expected key=value"));
    }

    #[test]
    fn test_parse_set_string_values_keeps_strings() {
        let args = vec!["replicas=5".to_string(), "debug=true".to_string()];
        let values = parse_set_string_values(&args).unwrap();

        assert_eq!(values.get("replicas").unwrap(), "5");
        assert_eq!(values.get("debug").unwrap(), "true");
    }

    #[test]
    fn test_to_yaml_is_sorted() {
        let values = Values::from_yaml("b: 1\na: 2").unwrap();
        assert_eq!(values.to_yaml().unwrap(), "a: 2\nb: 1\n");
    }
}
