//! Chart source definition and loading

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::values::Values;

/// Chart metadata file
pub const CHART_FILE: &str = "Chart.yaml";

/// Built-in chart defaults
pub const VALUES_FILE: &str = "values.yaml";

/// Encrypted values shipped with the chart
pub const SECRET_VALUES_FILE: &str = "secret-values.yaml";

/// Directory of encrypted files shipped with the chart
pub const SECRET_DIR: &str = "secret";

/// Templates directory
pub const TEMPLATES_DIR: &str = "templates";

/// Chart metadata (`Chart.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart API version
    #[serde(default = "default_chart_api_version")]
    pub api_version: String,

    /// Chart name
    pub name: String,

    /// Chart version (SemVer)
    pub version: Version,

    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Application version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

fn default_chart_api_version() -> String {
    "v2".to_string()
}

impl ChartMetadata {
    /// Metadata generated for charts that ship without a `Chart.yaml`
    pub fn generated(project: &str) -> Self {
        Self {
            api_version: default_chart_api_version(),
            name: project.to_string(),
            version: Version::new(0, 1, 0),
            description: None,
            app_version: None,
        }
    }
}

/// Chart directory with resolved paths
#[derive(Debug, Clone)]
pub struct ChartSource {
    /// Root directory of the chart
    pub root: PathBuf,

    /// Parsed `Chart.yaml`, if present
    pub metadata: Option<ChartMetadata>,

    /// Templates directory
    pub templates_dir: PathBuf,

    /// Defaults file path (if present)
    pub values_path: Option<PathBuf>,

    /// Encrypted values file path (if present)
    pub secret_values_path: Option<PathBuf>,
}

impl ChartSource {
    /// Load a chart from a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(CoreError::ChartNotFound {
                path: root.display().to_string(),
            });
        }

        let chart_file = root.join(CHART_FILE);
        let metadata = if chart_file.exists() {
            let content = std::fs::read_to_string(&chart_file)?;
            let metadata: ChartMetadata =
                serde_yaml::from_str(&content).map_err(|e| CoreError::InvalidChart {
                    message: format!("{}: {}", chart_file.display(), e),
                })?;
            Some(metadata)
        } else {
            None
        };

        let values_path = Some(root.join(VALUES_FILE)).filter(|p| p.is_file());
        let secret_values_path = Some(root.join(SECRET_VALUES_FILE)).filter(|p| p.is_file());

        Ok(Self {
            templates_dir: root.join(TEMPLATES_DIR),
            root,
            metadata,
            values_path,
            secret_values_path,
        })
    }

    /// Chart defaults from `values.yaml`, empty when the chart has none
    pub fn default_values(&self) -> Result<Values> {
        match &self.values_path {
            Some(path) => Values::from_file(path),
            None => Ok(Values::new()),
        }
    }

    /// Metadata, or generated metadata named after the project
    pub fn metadata_or_default(&self, project: &str) -> ChartMetadata {
        self.metadata
            .clone()
            .unwrap_or_else(|| ChartMetadata::generated(project))
    }

    /// Get list of template files, sorted for deterministic rendering
    pub fn template_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if !self.templates_dir.exists() {
            return Ok(files);
        }

        for entry in walkdir::WalkDir::new(&self.templates_dir) {
            let entry = entry.map_err(|e| CoreError::InvalidChart {
                message: format!("cannot list templates: {}", e),
            })?;
            let path = entry.path();
            if path.is_file() {
                if let Some(ext) = path.extension() {
                    let ext = ext.to_string_lossy().to_lowercase();
                    if matches!(ext.as_str(), "yaml" | "yml" | "tpl" | "j2" | "txt" | "json") {
                        files.push(path.to_path_buf());
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Whether a chart-relative path belongs in a materialized copy
    ///
    /// Defaults and secret material are excluded: the materialized chart gets
    /// a generated `values.yaml` instead.
    pub fn is_copied(relative: &Path) -> bool {
        let mut components = relative.components();
        let Some(first) = components.next() else {
            return false;
        };
        let first = first.as_os_str();
        let top_level_file = components.next().is_none();

        if first == SECRET_DIR {
            return false;
        }
        !(top_level_file && (first == VALUES_FILE || first == SECRET_VALUES_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_chart(with_metadata: bool) -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        if with_metadata {
            fs::write(
                root.join(CHART_FILE),
                "apiVersion: v2\nname: demo\nversion: 1.2.3\nappVersion: \"2.0\"\n",
            )
            .unwrap();
        }
        fs::write(root.join(VALUES_FILE), "replicas: 2\n").unwrap();
        fs::create_dir_all(root.join("templates/sub")).unwrap();
        fs::write(root.join("templates/deployment.yaml"), "kind: Deployment\n").unwrap();
        fs::write(root.join("templates/_helpers.tpl"), "").unwrap();
        fs::write(root.join("templates/sub/service.yaml"), "kind: Service\n").unwrap();
        fs::write(root.join("templates/README.md"), "ignored").unwrap();
        temp
    }

    #[test]
    fn test_load_chart() {
        let temp = create_chart(true);
        let chart = ChartSource::load(temp.path()).unwrap();

        let metadata = chart.metadata.as_ref().unwrap();
        assert_eq!(metadata.name, "demo");
        assert_eq!(metadata.version, Version::new(1, 2, 3));
        assert_eq!(chart.default_values().unwrap().get("replicas").unwrap(), 2);
        assert!(chart.secret_values_path.is_none());
    }

    #[test]
    fn test_load_without_metadata() {
        let temp = create_chart(false);
        let chart = ChartSource::load(temp.path()).unwrap();

        assert!(chart.metadata.is_none());
        let generated = chart.metadata_or_default("demo");
        assert_eq!(generated.name, "demo");
        assert_eq!(generated.version, Version::new(0, 1, 0));
    }

    #[test]
    fn test_load_missing_dir() {
        let err = ChartSource::load("/nonexistent/berth/chart").unwrap_err();
        assert!(matches!(err, CoreError::ChartNotFound { .. }));
    }

    #[test]
    fn test_template_files_sorted_and_filtered() {
        let temp = create_chart(true);
        let chart = ChartSource::load(temp.path()).unwrap();
        let files = chart.template_files().unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(&chart.templates_dir).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("_helpers.tpl"),
                PathBuf::from("deployment.yaml"),
                PathBuf::from("sub/service.yaml"),
            ]
        );
    }

    #[test]
    fn test_is_copied() {
        assert!(ChartSource::is_copied(Path::new("Chart.yaml")));
        assert!(ChartSource::is_copied(Path::new("templates/values.yaml")));
        assert!(!ChartSource::is_copied(Path::new("values.yaml")));
        assert!(!ChartSource::is_copied(Path::new("secret-values.yaml")));
        assert!(!ChartSource::is_copied(Path::new("secret/tls.key")));
    }
}
