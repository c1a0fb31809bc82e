//! OCI registry lookups for content-derived tags
//!
//! The `content-digest` strategy pins each image to the manifest digest that
//! `repo:tag` currently points at, so a later re-tag cannot change what runs.

use async_trait::async_trait;
use berth_core::{ImageReference, ImageSpec, TagStrategy};
use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;

use crate::error::{RegistryError, Result};
use crate::tag::{StaticTagResolver, TagResolver, normalize_tag};

/// Tag resolver backed by an OCI registry
///
/// Fixed-tag strategies are answered locally; only `content-digest` talks to
/// the registry.
pub struct RegistryTagResolver {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryTagResolver {
    /// Anonymous HTTPS client
    pub fn new() -> Self {
        Self {
            client: Self::create_client(ClientProtocol::Https),
            auth: RegistryAuth::Anonymous,
        }
    }

    /// Authenticate with username and password (or token)
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = RegistryAuth::Basic(username.into(), password.into());
        self
    }

    /// Talk plain HTTP (local development registries)
    pub fn insecure(mut self) -> Self {
        self.client = Self::create_client(ClientProtocol::Http);
        self
    }

    fn create_client(protocol: ClientProtocol) -> Client {
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        Client::new(config)
    }

    async fn manifest_digest(&self, reference: &Reference) -> Result<String> {
        match self.client.fetch_manifest_digest(reference, &self.auth).await {
            Ok(digest) => Ok(digest),
            Err(e) => {
                let error_str = e.to_string().to_lowercase();
                if error_str.contains("not found")
                    || error_str.contains("manifest unknown")
                    || error_str.contains("404")
                {
                    Err(RegistryError::ManifestNotFound {
                        reference: reference.whole(),
                    })
                } else {
                    Err(RegistryError::OciError {
                        reference: reference.whole(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

impl Default for RegistryTagResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagResolver for RegistryTagResolver {
    async fn resolve(
        &self,
        image: &ImageSpec,
        repository: &str,
        tag: &str,
        strategy: TagStrategy,
    ) -> Result<ImageReference> {
        if !strategy.is_content_derived() {
            return StaticTagResolver.resolve(image, repository, tag, strategy).await;
        }

        let tag = normalize_tag(tag, strategy)?;
        let reference = parse_reference(&format!("{}:{}", repository, tag))?;
        let digest = self.manifest_digest(&reference).await?;

        tracing::debug!(image = %image.name, %digest, "resolved manifest digest");
        Ok(ImageReference::tagged(&image.name, repository, tag).with_digest(digest))
    }
}

/// Parse an image reference string
///
/// Accepts `registry/repo:tag`, optionally prefixed with `oci://`.
pub fn parse_reference(reference: &str) -> Result<Reference> {
    let clean = reference
        .trim_start_matches("oci://")
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    clean
        .parse::<Reference>()
        .map_err(|e| RegistryError::InvalidReference {
            reference: format!("{}: {}", reference, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let reference = parse_reference("oci://ghcr.io/myorg/web:1.0.0").unwrap();
        assert_eq!(reference.registry(), "ghcr.io");
        assert_eq!(reference.repository(), "myorg/web");
        assert_eq!(reference.tag(), Some("1.0.0"));
    }

    #[test]
    fn test_parse_reference_invalid() {
        assert!(parse_reference("ghcr.io/MyOrg/Web:1.0").is_err());
    }

    #[tokio::test]
    async fn test_fixed_strategies_skip_registry() {
        let reference = RegistryTagResolver::new()
            .resolve(
                &ImageSpec::new("web"),
                "registry.invalid/demo/web",
                "feature/x",
                TagStrategy::GitBranch,
            )
            .await
            .unwrap();
        assert_eq!(reference.reference(), "registry.invalid/demo/web:feature-x");
        assert!(reference.digest.is_none());
    }
}
