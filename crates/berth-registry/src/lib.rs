//! Berth image resolution
//!
//! Turns the images declared in `berth.yaml` into deployable references:
//!
//! - **Fixed tags** (`custom`, `git-branch`, `git-tag`, `git-commit`) are
//!   validated and used as-is
//! - **Content digests** (`content-digest`) are looked up in the OCI registry
//!   and pinned as `repo@sha256:...`
//!
//! Lookups run concurrently with a bounded worker limit and fail fast.

pub mod error;
pub mod oci;
pub mod resolver;
pub mod tag;

pub use error::{RegistryError, Result};
pub use oci::{RegistryTagResolver, parse_reference};
pub use resolver::ImageInfoResolver;
pub use tag::{StaticTagResolver, TagResolver, normalize_tag};
