//! Project configuration (`berth.yaml`) loading

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::image::{ImageSpec, TagStrategy};

/// File name of the project configuration
pub const PROJECT_FILE: &str = "berth.yaml";

/// Expected `apiVersion` of the project configuration
pub const API_VERSION: &str = "berth/v1";

/// Maximum length of a release name
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// Maximum length of a namespace (DNS-1123 label)
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Project configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// API version (berth/v1)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Project name
    pub project: String,

    /// Images built and deployed by this project
    #[serde(default)]
    pub images: Vec<ImageSpec>,

    /// Deployment defaults
    #[serde(default)]
    pub deploy: DeploySettings,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

/// Deployment defaults; every field can be overridden on the command line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySettings {
    /// Chart directory, relative to the project directory
    #[serde(default = "default_chart_dir")]
    pub chart_dir: PathBuf,

    /// Repository root that images are pushed under
    #[serde(default)]
    pub images_repo: Option<String>,

    /// Tagging strategy
    #[serde(default)]
    pub tag_strategy: TagStrategy,

    /// Target namespace
    #[serde(default)]
    pub namespace: Option<String>,

    /// Release name
    #[serde(default)]
    pub release: Option<String>,

    /// Environment label
    #[serde(default)]
    pub env: Option<String>,

    /// Deploy timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            chart_dir: default_chart_dir(),
            images_repo: None,
            tag_strategy: TagStrategy::default(),
            namespace: None,
            release: None,
            env: None,
            timeout: default_timeout(),
        }
    }
}

fn default_chart_dir() -> PathBuf {
    PathBuf::from(".helm")
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

/// Project identity, loaded once per invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub project: String,
}

impl ProjectMeta {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    /// Default release name: `<project>-<env>`, or `<project>` without env
    pub fn default_release(&self, env: Option<&str>) -> String {
        slugify(&self.qualified(env), MAX_RELEASE_NAME_LEN)
    }

    /// Default namespace: same scheme as the release, DNS-1123 label sized
    pub fn default_namespace(&self, env: Option<&str>) -> String {
        slugify(&self.qualified(env), MAX_NAMESPACE_LEN)
    }

    fn qualified(&self, env: Option<&str>) -> String {
        match env.filter(|e| !e.is_empty()) {
            Some(env) => format!("{}-{}", self.project, env),
            None => self.project.clone(),
        }
    }
}

impl ProjectConfig {
    /// Load `berth.yaml` from a project directory
    pub fn load<P: AsRef<Path>>(project_dir: P) -> Result<Self> {
        let path = project_dir.as_ref().join(PROJECT_FILE);
        if !path.exists() {
            return Err(CoreError::ProjectNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a project configuration
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api_version != API_VERSION {
            return Err(CoreError::InvalidProject {
                message: format!(
                    "Unsupported API version: {}. Expected: {}",
                    self.api_version, API_VERSION
                ),
            });
        }

        if self.project.trim().is_empty() {
            return Err(CoreError::InvalidProject {
                message: "project name must not be empty".to_string(),
            });
        }

        if let Some(image) = self.images.iter().find(|i| i.name.trim().is_empty()) {
            return Err(CoreError::InvalidProject {
                message: format!("image with context '{}' has an empty name", image.context),
            });
        }

        Ok(())
    }

    /// Project identity
    pub fn meta(&self) -> ProjectMeta {
        ProjectMeta::new(&self.project)
    }

    /// Absolute chart directory for this project
    pub fn chart_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.deploy.chart_dir)
    }
}

/// Normalize a name into a lowercase DNS-1123 label of at most `max_len` chars
///
/// Over-long names are truncated and suffixed with a short content hash so
/// distinct inputs stay distinct.
pub fn slugify(name: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    let slug = slug.trim_matches('-').to_string();

    if slug.len() <= max_len {
        return slug;
    }

    let hash = hex::encode(Sha256::digest(name.as_bytes()));
    let keep = max_len.saturating_sub(9);
    format!("{}-{}", slug[..keep].trim_end_matches('-'), &hash[..8])
}
