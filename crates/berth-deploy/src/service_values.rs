//! Service values: cluster-facing metadata computed for every deploy
//!
//! Templates reach these through well-known keys:
//!
//! ```yaml
//! project: demo
//! namespace: staging
//! env: staging
//! images:
//!   web:
//!     name: web
//!     image: registry.example.com/demo/web:abc123
//!     repository: registry.example.com/demo/web
//!     tag: abc123
//! global:
//!   project: demo
//!   namespace: staging
//!   env: staging
//!   berth:
//!     repo: registry.example.com/demo
//!     tag: abc123
//!     tagStrategy: custom
//!     ci: { isTag: false, isBranch: false }
//! ```
//!
//! Secrets never pass through here.

use berth_core::{ImageReference, ProjectMeta, TagStrategy, Values};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;

use crate::error::DeployError;

/// Maximum length of a namespace (DNS-1123 label)
const MAX_NAMESPACE_LEN: usize = 63;

/// Inputs to [`compose_service_values`]
#[derive(Debug, Clone, Copy)]
pub struct ServiceValuesInput<'a> {
    pub meta: &'a ProjectMeta,
    pub images_repo: &'a str,
    pub namespace: &'a str,
    pub tag: &'a str,
    pub tag_strategy: TagStrategy,
    pub images: &'a BTreeMap<String, ImageReference>,
    pub env: Option<&'a str>,
}

/// Computed, non-secret deployment metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceValues(Values);

impl ServiceValues {
    pub fn values(&self) -> &Values {
        &self.0
    }

    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        self.0.get(path)
    }
}

/// Compose the service values document
///
/// Pure: the same input always produces the same document.
pub fn compose_service_values(
    input: &ServiceValuesInput<'_>,
) -> Result<ServiceValues, DeployError> {
    let project = input.meta.project.trim();
    if project.is_empty() {
        return Err(DeployError::service_value("project name is empty"));
    }
    validate_namespace(input.namespace)?;

    let mut images = Map::new();
    for (name, reference) in input.images {
        if name.trim().is_empty() {
            return Err(DeployError::service_value("image name is empty"));
        }
        images.insert(name.clone(), image_entry(reference));
    }

    let env = input.env.unwrap_or_default();

    let values = json!({
        "project": project,
        "namespace": input.namespace,
        "env": env,
        "images": images,
        "global": {
            "project": project,
            "namespace": input.namespace,
            "env": env,
            "berth": {
                "repo": input.images_repo,
                "tag": input.tag,
                "tagStrategy": input.tag_strategy.as_str(),
                "ci": ci_info(input.tag, input.tag_strategy),
            },
        },
    });

    Ok(ServiceValues(Values(values)))
}

fn image_entry(reference: &ImageReference) -> JsonValue {
    let mut entry = Map::new();
    entry.insert("name".into(), reference.name.clone().into());
    entry.insert("image".into(), reference.reference().into());
    entry.insert("repository".into(), reference.repository.clone().into());
    entry.insert("tag".into(), reference.tag.clone().into());
    if let Some(digest) = &reference.digest {
        entry.insert("digest".into(), digest.clone().into());
    }
    JsonValue::Object(entry)
}

/// CI metadata derived from how the tag was chosen
fn ci_info(tag: &str, strategy: TagStrategy) -> JsonValue {
    match strategy {
        TagStrategy::GitTag => json!({
            "isTag": true,
            "isBranch": false,
            "tag": tag,
            "ref": tag,
        }),
        TagStrategy::GitBranch => json!({
            "isTag": false,
            "isBranch": true,
            "branch": tag,
            "ref": tag,
        }),
        _ => json!({ "isTag": false, "isBranch": false }),
    }
}

fn validate_namespace(namespace: &str) -> Result<(), DeployError> {
    if namespace.is_empty() {
        return Err(DeployError::service_value("namespace is empty"));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(DeployError::service_value(format!(
            "namespace '{}' is longer than {} characters",
            namespace, MAX_NAMESPACE_LEN
        )));
    }

    let valid_chars = namespace
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !namespace.starts_with('-') && !namespace.ends_with('-');
    if !valid_chars || !valid_edges {
        return Err(DeployError::service_value(format!(
            "namespace '{}' is not a valid DNS-1123 label",
            namespace
        )));
    }

    Ok(())
}
