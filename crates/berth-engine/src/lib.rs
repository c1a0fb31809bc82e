//! Berth Engine - chart rendering with MiniJinja
//!
//! Renders a chart's templates against the final merged values:
//! - `values`, `release` and `chart` in the template context
//! - Helm-style filters (toyaml, b64encode, nindent, ...)
//! - `image("name")` to reference resolved images
//! - Source-annotated errors through miette

pub mod engine;
pub mod error;
pub mod filters;

pub use engine::{Engine, EngineBuilder, ReleaseInfo, RenderContext, RenderResult};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
