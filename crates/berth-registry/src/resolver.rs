//! Concurrent image resolution

use berth_core::{ImageReference, ImageSpec, TagStrategy, image_repository};
use futures::{StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::tag::TagResolver;

/// Resolves every configured image to its deployable reference
///
/// Lookups run concurrently, at most `concurrency` at a time. The first
/// failure ends resolution; lookups still in flight are dropped.
pub struct ImageInfoResolver {
    tag_resolver: Arc<dyn TagResolver>,
    concurrency: usize,
}

impl ImageInfoResolver {
    /// Default number of concurrent lookups
    pub const DEFAULT_CONCURRENCY: usize = 4;

    pub fn new(tag_resolver: Arc<dyn TagResolver>) -> Self {
        Self {
            tag_resolver,
            concurrency: Self::DEFAULT_CONCURRENCY,
        }
    }

    /// Set the worker limit (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Resolve all images, keyed by image name
    pub async fn resolve(
        &self,
        images: &[ImageSpec],
        images_repo: &str,
        tag: &str,
        strategy: TagStrategy,
    ) -> Result<BTreeMap<String, ImageReference>> {
        check_unique(images)?;

        if images.is_empty() {
            return Ok(BTreeMap::new());
        }
        if images_repo.trim().is_empty() {
            return Err(RegistryError::MissingImagesRepo {
                count: images.len(),
            });
        }

        tracing::debug!(
            count = images.len(),
            concurrency = self.concurrency,
            %strategy,
            "resolving images"
        );

        futures::stream::iter(images)
            .map(|image| {
                let repository = image_repository(images_repo, &image.name);
                let resolver = Arc::clone(&self.tag_resolver);
                async move {
                    resolver
                        .resolve(image, &repository, tag, strategy)
                        .await
                        .map(|reference| (image.name.clone(), reference))
                        .map_err(|e| RegistryError::for_image(&image.name, e))
                }
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await
    }
}

fn check_unique(images: &[ImageSpec]) -> Result<()> {
    let mut seen = HashSet::with_capacity(images.len());
    for image in images {
        if !seen.insert(image.name.as_str()) {
            return Err(RegistryError::DuplicateImage {
                name: image.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::StaticTagResolver;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records how many lookups overlap and fails on request
    #[derive(Default)]
    struct RecordingResolver {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl TagResolver for RecordingResolver {
        async fn resolve(
            &self,
            image: &ImageSpec,
            repository: &str,
            tag: &str,
            _strategy: TagStrategy,
        ) -> Result<ImageReference> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.as_deref() == Some(image.name.as_str()) {
                return Err(RegistryError::ManifestNotFound {
                    reference: format!("{}:{}", repository, tag),
                });
            }
            Ok(ImageReference::tagged(&image.name, repository, tag))
        }
    }

    fn images(names: &[&str]) -> Vec<ImageSpec> {
        names.iter().map(|n| ImageSpec::new(*n)).collect()
    }

    #[tokio::test]
    async fn test_one_entry_per_image() {
        let resolver = ImageInfoResolver::new(Arc::new(StaticTagResolver));
        let refs = resolver
            .resolve(
                &images(&["web", "worker"]),
                "registry.example.com/demo",
                "abc123",
                TagStrategy::Custom,
            )
            .await
            .unwrap();

        assert_eq!(refs.len(), 2);
        assert_eq!(refs["web"].reference(), "registry.example.com/demo/web:abc123");
        assert_eq!(refs["worker"].reference(), "registry.example.com/demo/worker:abc123");
    }

    #[tokio::test]
    async fn test_deterministic() {
        let resolver = ImageInfoResolver::new(Arc::new(StaticTagResolver));
        let specs = images(&["a", "b", "c"]);
        let first = resolver.resolve(&specs, "r", "v1", TagStrategy::GitTag).await.unwrap();
        let second = resolver.resolve(&specs, "r", "v1", TagStrategy::GitTag).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_duplicate_names_fail_before_lookup() {
        let recorder = Arc::new(RecordingResolver::default());
        let resolver = ImageInfoResolver::new(recorder.clone());

        let err = resolver
            .resolve(&images(&["web", "web"]), "r", "v1", TagStrategy::Custom)
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateImage { ref name } if name == "web"));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let recorder = Arc::new(RecordingResolver::default());
        let resolver = ImageInfoResolver::new(recorder.clone()).with_concurrency(2);
        let names: Vec<String> = (0..8).map(|i| format!("img{i}")).collect();
        let specs: Vec<_> = names.iter().map(ImageSpec::new).collect();

        let refs = resolver.resolve(&specs, "r", "v1", TagStrategy::Custom).await.unwrap();

        assert_eq!(refs.len(), 8);
        assert!(recorder.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_names_image() {
        let recorder = Arc::new(RecordingResolver {
            fail_on: Some("worker".to_string()),
            ..Default::default()
        });
        let resolver = ImageInfoResolver::new(recorder);

        let err = resolver
            .resolve(&images(&["web", "worker"]), "r", "v1", TagStrategy::Custom)
            .await
            .unwrap_err();

        assert!(
            matches!(err, RegistryError::ImageResolution { ref image, .. } if image == "worker")
        );
    }

    #[tokio::test]
    async fn test_empty_images_need_no_repo() {
        let resolver = ImageInfoResolver::new(Arc::new(StaticTagResolver));
        let refs = resolver.resolve(&[], "", "", TagStrategy::Custom).await.unwrap();
        assert!(refs.is_empty());

        let err = resolver
            .resolve(&images(&["web"]), " ", "v1", TagStrategy::Custom)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingImagesRepo { count: 1 }));
    }
}
