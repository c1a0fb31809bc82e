//! Tag resolvers: turn a strategy and a raw tag into an image reference

use async_trait::async_trait;
use berth_core::{ImageReference, ImageSpec, TagStrategy};

use crate::error::{RegistryError, Result};

/// Maximum length of an OCI tag
pub const MAX_TAG_LEN: usize = 128;

/// Resolves one image's deployable reference
///
/// Implementations must be deterministic for fixed inputs.
#[async_trait]
pub trait TagResolver: Send + Sync {
    async fn resolve(
        &self,
        image: &ImageSpec,
        repository: &str,
        tag: &str,
        strategy: TagStrategy,
    ) -> Result<ImageReference>;
}

/// Resolver for strategies whose tag is known up front
///
/// Content-derived strategies are rejected; use `RegistryTagResolver` for those.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticTagResolver;

#[async_trait]
impl TagResolver for StaticTagResolver {
    async fn resolve(
        &self,
        image: &ImageSpec,
        repository: &str,
        tag: &str,
        strategy: TagStrategy,
    ) -> Result<ImageReference> {
        if strategy.is_content_derived() {
            return Err(RegistryError::InvalidTag {
                tag: tag.to_string(),
                strategy: strategy.to_string(),
                reason: "strategy needs a registry lookup".to_string(),
            });
        }
        let tag = normalize_tag(tag, strategy)?;
        Ok(ImageReference::tagged(&image.name, repository, tag))
    }
}

/// Validate a raw tag, rewriting git branch names into tag-safe form
///
/// `feature/login` becomes `feature-login` under `git-branch`; every other
/// strategy takes the tag verbatim and only validates it.
pub fn normalize_tag(tag: &str, strategy: TagStrategy) -> Result<String> {
    let invalid = |reason: &str| RegistryError::InvalidTag {
        tag: tag.to_string(),
        strategy: strategy.to_string(),
        reason: reason.to_string(),
    };

    let tag = if strategy == TagStrategy::GitBranch {
        tag.chars()
            .map(|c| if is_tag_char(c) { c } else { '-' })
            .collect::<String>()
            .trim_start_matches(['.', '-'])
            .to_string()
    } else {
        tag.to_string()
    };

    if tag.is_empty() {
        return Err(invalid("tag is empty"));
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(invalid("tag is longer than 128 characters"));
    }
    if tag.starts_with(['.', '-']) {
        return Err(invalid("tag must start with a letter, digit or underscore"));
    }
    if !tag.chars().all(is_tag_char) {
        return Err(invalid("allowed characters are letters, digits, '_', '.' and '-'"));
    }

    Ok(tag)
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}
