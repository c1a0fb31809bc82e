//! Berth Deploy - the release deployment pipeline
//!
//! [`Deployer::deploy`] turns a project, its images and user overrides into
//! one applied release:
//!
//! 1. Resolve image references and load secrets, concurrently
//! 2. Compose service values (namespace, env, images, CI info)
//! 3. Materialize the chart into a private temporary directory
//! 4. Hand it to a [`ReleaseEngine`] with the user's overrides on top
//! 5. Delete the temporary chart, whatever happened
//!
//! The cluster side lives behind [`ReleaseEngine`]; progress goes to a
//! [`DiagnosticSink`].

pub mod deployer;
pub mod diagnostics;
pub mod error;
pub mod materialize;
pub mod orchestrator;
pub mod service_values;

pub use deployer::{
    DeploymentTarget, EngineFailure, EngineReport, EngineRequest, OverrideSet, ReleaseDeployer,
    ReleaseEngine,
};
pub use diagnostics::{DiagnosticSink, Level, MemorySink, TracingSink};
pub use error::{CleanupError, DeployError, Stage};
pub use materialize::{ChartMaterializer, MaterializedChart};
pub use orchestrator::{DEFAULT_TIMEOUT, DeployOptions, DeployOutcome, DeployRequest, Deployer};
pub use service_values::{ServiceValues, ServiceValuesInput, compose_service_values};
