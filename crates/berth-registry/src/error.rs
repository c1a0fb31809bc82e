//! Error types for image resolution

use thiserror::Error;

/// Image resolution errors
#[derive(Debug, Error)]
pub enum RegistryError {
    // ============ Configuration Errors ============
    #[error("Duplicate image name '{name}' in project configuration")]
    DuplicateImage { name: String },

    #[error("No images repository configured (required to resolve {count} image(s))")]
    MissingImagesRepo { count: usize },

    #[error("Invalid tag '{tag}' for strategy {strategy}: {reason}")]
    InvalidTag {
        tag: String,
        strategy: String,
        reason: String,
    },

    // ============ OCI Errors ============
    #[error("Invalid image reference: {reference}")]
    InvalidReference { reference: String },

    #[error("Manifest not found: {reference}")]
    ManifestNotFound { reference: String },

    #[error("OCI registry error for {reference}: {message}")]
    OciError { reference: String, message: String },

    // ============ Resolution ============
    #[error("Cannot resolve image '{image}': {source}")]
    ImageResolution {
        image: String,
        #[source]
        source: Box<RegistryError>,
    },
}

impl RegistryError {
    /// Wrap a lookup failure with the image it belongs to
    pub fn for_image(image: impl Into<String>, source: RegistryError) -> Self {
        match source {
            already @ RegistryError::ImageResolution { .. } => already,
            source => RegistryError::ImageResolution {
                image: image.into(),
                source: Box::new(source),
            },
        }
    }
}

/// Result type for image resolution
pub type Result<T> = std::result::Result<T, RegistryError>;
