//! Rendered manifest parsing

use kube::api::DynamicObject;
use std::collections::BTreeMap;

use crate::category::ResourceCategory;
use crate::error::{KubeError, Result};

/// One Kubernetes object from a rendered template
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Template the object came from
    pub source: String,
    pub object: DynamicObject,
}

impl Manifest {
    pub fn api_version(&self) -> &str {
        self.object
            .types
            .as_ref()
            .map(|t| t.api_version.as_str())
            .unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.object
            .types
            .as_ref()
            .map(|t| t.kind.as_str())
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.object.metadata.name.as_deref().unwrap_or_default()
    }

    /// `Kind/name`
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }

    pub fn category(&self) -> ResourceCategory {
        ResourceCategory::from_resource(self.kind(), self.api_version())
    }
}

/// Parse rendered templates into objects, in apply order
///
/// Templates are visited in name order and objects keep their relative order
/// within a category.
pub fn parse_manifests(rendered: &BTreeMap<String, String>) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();

    for (source, content) in rendered {
        for (index, doc) in split_documents(content).into_iter().enumerate() {
            let manifest = parse_document(source, doc).map_err(|e| {
                KubeError::InvalidManifest(format!("{} (document {}): {}", source, index, e))
            })?;
            manifests.push(manifest);
        }
    }

    manifests.sort_by_key(Manifest::category);
    Ok(manifests)
}

fn parse_document(source: &str, doc: &str) -> Result<Manifest> {
    let object: DynamicObject = serde_yaml::from_str(doc)?;

    let types = object
        .types
        .as_ref()
        .filter(|t| !t.api_version.is_empty() && !t.kind.is_empty())
        .ok_or_else(|| KubeError::InvalidManifest("missing apiVersion or kind".to_string()))?;

    if object.metadata.name.as_deref().is_none_or(str::is_empty) {
        return Err(KubeError::InvalidManifest(format!(
            "{} is missing metadata.name",
            types.kind
        )));
    }

    Ok(Manifest {
        source: source.to_string(),
        object,
    })
}

/// Split a multi-document YAML stream, dropping empty and comment-only documents
fn split_documents(content: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        if line.trim_end() == "---" {
            docs.push(&content[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    docs.push(&content[start..]);

    docs.into_iter()
        .filter(|doc| {
            doc.lines()
                .any(|l| !l.trim().is_empty() && !l.trim().starts_with('#'))
        })
        .collect()
}
