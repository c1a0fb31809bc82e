//! Berth Core - Core types shared by every Berth crate
//!
//! - `ProjectConfig`: the project definition (`berth.yaml`)
//! - `Values`: configuration values with deep merge support
//! - `ChartSource`: a chart directory on disk
//! - `ImageSpec` / `ImageReference`: declared images and their resolved references
//! - `SecretStore`: encrypted secret values, decrypted in memory

pub mod chart;
pub mod error;
pub mod image;
pub mod project;
pub mod secrets;
pub mod values;

pub use chart::{ChartMetadata, ChartSource};
pub use error::{CoreError, Result, SecretError};
pub use image::{ImageReference, ImageSpec, TagStrategy, image_repository};
pub use project::{DeploySettings, ProjectConfig, ProjectMeta, slugify};
pub use secrets::{
    AesGcmBackend, CipherError, SecretBackend, SecretDocument, SecretInput, SecretStore,
};
pub use values::{Values, parse_set_string_values, parse_set_values};
