//! The `deploy` entry point
//!
//! Sequences image resolution and secret loading (concurrently), value
//! composition, chart materialization and deployment. The materialized chart
//! is released on every path out of [`Deployer::deploy`].

use berth_core::chart::SECRET_VALUES_FILE;
use berth_core::{
    ChartSource, ImageReference, ProjectConfig, SecretBackend, SecretInput, SecretStore,
    TagStrategy,
};
use berth_registry::{ImageInfoResolver, TagResolver};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::deployer::{DeploymentTarget, EngineReport, OverrideSet, ReleaseDeployer, ReleaseEngine};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::{DeployError, Stage};
use crate::materialize::ChartMaterializer;
use crate::service_values::{ServiceValuesInput, compose_service_values};

/// Default deploy timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-invocation options
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Value files, lowest precedence first
    pub values: Vec<PathBuf>,
    /// Encrypted secret inputs, merged after the chart's own secret values
    pub secret_values: Vec<SecretInput>,
    pub set: Vec<String>,
    pub set_string: Vec<String>,
    pub timeout: Duration,
    pub kube_context: Option<String>,
    pub env: Option<String>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            secret_values: Vec::new(),
            set: Vec::new(),
            set_string: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            kube_context: None,
            env: None,
        }
    }
}

/// One deployment
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub project_dir: PathBuf,
    pub images_repo: String,
    pub release: String,
    pub namespace: String,
    pub tag: String,
    pub tag_strategy: TagStrategy,
    pub config: ProjectConfig,
    pub options: DeployOptions,
}

impl DeployRequest {
    fn overrides(&self) -> OverrideSet {
        OverrideSet {
            values: self.options.values.clone(),
            set: self.options.set.clone(),
            set_string: self.options.set_string.clone(),
        }
    }

    fn target(&self) -> DeploymentTarget {
        DeploymentTarget {
            release: self.release.clone(),
            namespace: self.namespace.clone(),
            kube_context: self.options.kube_context.clone(),
            timeout: self.options.timeout,
        }
    }

    /// Secret inputs, with the chart's `secret-values.yaml` first when present
    fn secret_inputs(&self) -> Vec<SecretInput> {
        let chart_secrets = self
            .config
            .chart_path(&self.project_dir)
            .join(SECRET_VALUES_FILE);

        let mut inputs = Vec::with_capacity(self.options.secret_values.len() + 1);
        if chart_secrets.is_file() {
            inputs.push(SecretInput::File(chart_secrets));
        }
        inputs.extend(self.options.secret_values.iter().cloned());
        inputs
    }
}

/// Result of a successful deployment
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub release: String,
    pub namespace: String,
    pub images: BTreeMap<String, ImageReference>,
    pub report: EngineReport,
}

/// Runs the deployment pipeline
pub struct Deployer {
    image_resolver: ImageInfoResolver,
    deployer: ReleaseDeployer,
    sink: Arc<dyn DiagnosticSink>,
    materializer: ChartMaterializer,
    secret_backend: Option<Arc<dyn SecretBackend>>,
    deadline: Option<Duration>,
}

impl Deployer {
    pub fn new(tag_resolver: Arc<dyn TagResolver>, engine: Arc<dyn ReleaseEngine>) -> Self {
        Self {
            image_resolver: ImageInfoResolver::new(tag_resolver),
            deployer: ReleaseDeployer::new(engine),
            sink: Arc::new(TracingSink),
            materializer: ChartMaterializer::new(Self::default_tmp_root()),
            secret_backend: None,
            deadline: None,
        }
    }

    /// `<system temp>/berth-charts`
    pub fn default_tmp_root() -> PathBuf {
        std::env::temp_dir().join("berth-charts")
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_tmp_root(mut self, tmp_root: impl Into<PathBuf>) -> Self {
        self.materializer = ChartMaterializer::new(tmp_root);
        self
    }

    /// Decrypt secrets with this backend instead of the project key
    pub fn with_secret_backend(mut self, backend: Arc<dyn SecretBackend>) -> Self {
        self.secret_backend = Some(backend);
        self
    }

    /// Bound everything before the deploy stage
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Maximum concurrent image lookups
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.image_resolver = self.image_resolver.with_concurrency(concurrency);
        self
    }

    /// Deploy one release
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployOutcome, DeployError> {
        self.sink.info(&format!("Using release: {}", request.release));
        self.sink.info(&format!("Using namespace: {}", request.namespace));

        let result = self.run(&request).await;

        match &result {
            Ok(_) => self.enter(Stage::Done),
            Err(e) => {
                tracing::debug!(stage = %e.stage(), error = %e, "deploy failed");
                self.enter(Stage::Failed);
            }
        }
        result
    }

    fn enter(&self, stage: Stage) {
        tracing::debug!(%stage, "entering stage");
        self.sink.stage(stage);
    }

    fn check_deadline(&self, started: Instant, stage: Stage) -> Result<(), DeployError> {
        match self.deadline {
            Some(deadline) if started.elapsed() >= deadline => {
                Err(DeployError::DeadlineExceeded { stage, deadline })
            }
            _ => Ok(()),
        }
    }

    async fn run(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError> {
        let started = Instant::now();

        // Images and secrets are independent; both must finish before composing.
        self.enter(Stage::ResolvingImages);
        self.enter(Stage::LoadingSecrets);

        let images_done = AtomicBool::new(false);
        let images = async {
            let images = self
                .image_resolver
                .resolve(
                    &request.config.images,
                    &request.images_repo,
                    &request.tag,
                    request.tag_strategy,
                )
                .await
                .map_err(DeployError::from)?;
            images_done.store(true, Ordering::SeqCst);
            Ok::<_, DeployError>(images)
        };

        let inputs = request.secret_inputs();
        let store = match &self.secret_backend {
            Some(backend) => {
                SecretStore::new(&request.project_dir).with_backend(Arc::clone(backend))
            }
            None => SecretStore::new(&request.project_dir),
        };
        let secrets = async { store.load(&inputs).await.map_err(DeployError::from) };

        let joined = async { tokio::try_join!(images, secrets) };
        let (images, secrets) = match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(started + deadline, joined).await {
                Ok(result) => result?,
                Err(_) => {
                    let stage = if images_done.load(Ordering::SeqCst) {
                        Stage::LoadingSecrets
                    } else {
                        Stage::ResolvingImages
                    };
                    return Err(DeployError::DeadlineExceeded { stage, deadline });
                }
            },
            None => joined.await?,
        };

        self.check_deadline(started, Stage::ComposingValues)?;
        self.enter(Stage::ComposingValues);
        let meta = request.config.meta();
        let service = compose_service_values(&ServiceValuesInput {
            meta: &meta,
            images_repo: &request.images_repo,
            namespace: &request.namespace,
            tag: &request.tag,
            tag_strategy: request.tag_strategy,
            images: &images,
            env: request.options.env.as_deref(),
        })?;

        self.check_deadline(started, Stage::MaterializingChart)?;
        self.enter(Stage::MaterializingChart);
        let chart_path = request.config.chart_path(&request.project_dir);
        let chart = ChartSource::load(&chart_path)
            .map_err(|e| DeployError::chart_prep(&chart_path, e))?;
        let materialized = self
            .materializer
            .materialize(&chart, &meta.project, &secrets, &service)?;
        drop(secrets);

        self.enter(Stage::Deploying);
        let deployed = self
            .deployer
            .deploy(&materialized, &request.target(), &request.overrides())
            .await;

        if let Err(cleanup) = materialized.release() {
            tracing::warn!(error = %cleanup, "cleanup failed");
            self.sink.warn(&cleanup.to_string());
        }

        let report = deployed?;
        Ok(DeployOutcome {
            release: request.release.clone(),
            namespace: request.namespace.clone(),
            images,
            report,
        })
    }
}
