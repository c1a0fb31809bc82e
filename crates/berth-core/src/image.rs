//! Image definitions, tagging strategies and resolved references

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// An image declared in `berth.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Image name, unique within the project
    pub name: String,

    /// Build context identifier (path relative to the project directory)
    #[serde(default = "default_context")]
    pub context: String,
}

fn default_context() -> String {
    ".".to_string()
}

impl ImageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: default_context(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// Policy used to derive an image's deployable reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagStrategy {
    /// Tag supplied verbatim by the user
    #[default]
    Custom,
    /// Tag is a git branch name
    GitBranch,
    /// Tag is a git tag
    GitTag,
    /// Tag is a git commit id
    GitCommit,
    /// Tag is resolved to the immutable manifest digest in the registry
    ContentDigest,
}

impl TagStrategy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::GitBranch => "git-branch",
            Self::GitTag => "git-tag",
            Self::GitCommit => "git-commit",
            Self::ContentDigest => "content-digest",
        }
    }

    /// Whether resolving this strategy needs a registry round-trip
    pub const fn is_content_derived(&self) -> bool {
        matches!(self, Self::ContentDigest)
    }
}

impl fmt::Display for TagStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "custom" => Ok(Self::Custom),
            "git-branch" | "branch" => Ok(Self::GitBranch),
            "git-tag" | "tag" => Ok(Self::GitTag),
            "git-commit" | "commit" => Ok(Self::GitCommit),
            "content-digest" | "digest" => Ok(Self::ContentDigest),
            _ => Err(CoreError::UnknownTagStrategy(s.to_string())),
        }
    }
}

/// Final deployable reference for one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    /// Image name from the project config
    pub name: String,

    /// Full repository path (e.g. `registry.example.com/demo/web`)
    pub repository: String,

    /// Display tag
    pub tag: String,

    /// Manifest digest, when resolved by content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn tagged(
        name: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            tag: tag.into(),
            digest: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Pullable reference: `repo@digest` when pinned, `repo:tag` otherwise
    pub fn reference(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.repository, digest),
            None => format!("{}:{}", self.repository, self.tag),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference())
    }
}

/// Repository path for an image under the project's images repo
pub fn image_repository(images_repo: &str, image_name: &str) -> String {
    format!("{}/{}", images_repo.trim_end_matches('/'), image_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_strategy_parse() {
        assert_eq!("custom".parse::<TagStrategy>().unwrap(), TagStrategy::Custom);
        assert_eq!("GIT-TAG".parse::<TagStrategy>().unwrap(), TagStrategy::GitTag);
        assert_eq!("digest".parse::<TagStrategy>().unwrap(), TagStrategy::ContentDigest);
        assert!("latest".parse::<TagStrategy>().is_err());
    }

    #[test]
    fn test_tag_strategy_serde_kebab_case() {
        let strategy: TagStrategy = serde_yaml::from_str("git-branch").unwrap();
        assert_eq!(strategy, TagStrategy::GitBranch);
        assert_eq!(strategy.to_string(), "git-branch");
    }

    #[test]
    fn test_reference_tagged() {
        let image = ImageReference::tagged("web", "registry.example.com/demo/web", "abc123");
        assert_eq!(image.reference(), "registry.example.com/demo/web:abc123");
    }

    #[test]
    fn test_reference_digest_wins() {
        let image = ImageReference::tagged("web", "registry.example.com/demo/web", "abc123")
            .with_digest("sha256:0123");
        assert_eq!(image.reference(), "registry.example.com/demo/web@sha256:0123");
    }

    #[test]
    fn test_image_repository_trims_slash() {
        assert_eq!(
            image_repository("registry.example.com/demo/", "web"),
            "registry.example.com/demo/web"
        );
    }
}
