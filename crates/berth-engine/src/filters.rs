//! Template filters and functions
//!
//! Helm-style helpers on top of MiniJinja's builtins, plus `image()` for
//! looking up resolved image references from the service values.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, State, Value};
use sha2::{Digest, Sha256};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

/// Convert a value to YAML format
///
/// Usage: {{ values.resources | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Convert a value to compact JSON
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;

    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

fn as_plain_string(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// Quote with double quotes
///
/// Usage: {{ values.env | quote }}
pub fn quote(value: Value) -> String {
    let s = as_plain_string(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn squote(value: Value) -> String {
    format!("'{}'", as_plain_string(&value).replace('\'', "''"))
}

/// Indent every non-empty line, with a leading newline
///
/// Usage: {{ values.labels | toyaml | nindent(4) }}
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Indent every non-empty line
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fail rendering when a value is undefined, null or empty
///
/// Usage: {{ values.host | required("host is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);

    if missing {
        Err(invalid(
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ))
    } else {
        Ok(value)
    }
}

/// SHA256 hex digest, handy for checksum annotations
pub fn sha256sum(value: String) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Truncate to at most `length` characters
///
/// Usage: {{ release.name | trunc(63) }}
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(&prefix).unwrap_or(&value).to_string()
}

pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(&suffix).unwrap_or(&value).to_string()
}

/// Pullable reference of a resolved image
///
/// Usage: image: {{ image("web") }}
pub fn image(state: &State, name: &str) -> Result<Value, Error> {
    let reference = state
        .lookup("values")
        .and_then(|values| values.get_attr("images").ok())
        .and_then(|images| images.get_attr(name).ok())
        .and_then(|entry| entry.get_attr("image").ok())
        .filter(|reference| !reference.is_undefined() && !reference.is_none());

    reference.ok_or_else(|| {
        Error::new(
            ErrorKind::UndefinedError,
            format!("unknown image '{}' (not declared in berth.yaml)", name),
        )
    })
}

/// Abort rendering with a message
///
/// Usage: {{ fail("replicas must be positive") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}
