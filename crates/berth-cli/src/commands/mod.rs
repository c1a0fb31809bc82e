//! CLI commands

pub mod deploy;
pub mod render;
pub mod secret;

use berth_core::{AesGcmBackend, ProjectConfig, SecretInput, TagStrategy};
use berth_deploy::{DeployOptions, DeployRequest, Deployer, DiagnosticSink, ReleaseEngine};
use berth_registry::RegistryTagResolver;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CliError, Result};

/// Arguments shared by every command that runs the pipeline
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Project directory containing berth.yaml
    #[arg(short = 'd', long, default_value = ".")]
    pub dir: PathBuf,

    /// Image tag to deploy
    #[arg(short = 't', long)]
    pub tag: String,

    /// Repository images are pushed under (overrides deploy.imagesRepo)
    #[arg(long, env = "BERTH_REPO")]
    pub repo: Option<String>,

    /// Tagging strategy: custom, git-branch, git-tag, git-commit, content-digest
    #[arg(long)]
    pub tag_strategy: Option<String>,

    /// Environment label, used in default names and exposed to templates
    #[arg(long, env = "BERTH_ENV")]
    pub env: Option<String>,

    /// Release name (default: <project>-<env>)
    #[arg(long)]
    pub release: Option<String>,

    /// Target namespace (default: <project>-<env>)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Values file(s) to merge, in order
    #[arg(short = 'f', long = "values")]
    pub values: Vec<PathBuf>,

    /// Set values on command line (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Set string values on command line (key=value)
    #[arg(long = "set-string")]
    pub set_string: Vec<String>,

    /// Encrypted values file(s), merged after the chart's secret-values.yaml
    #[arg(long = "secret-values")]
    pub secret_values: Vec<PathBuf>,

    /// Hex-encoded secret key (default: .berth_secret_key in the project)
    #[arg(long, env = "BERTH_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Directory for temporary charts
    #[arg(long, env = "BERTH_TMP_DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Limit for everything before the deploy itself (e.g. 2m)
    #[arg(long, value_parser = parse_duration)]
    pub deadline: Option<Duration>,

    /// Registry user for content-digest lookups
    #[arg(long, env = "BERTH_REGISTRY_USERNAME")]
    pub registry_username: Option<String>,

    /// Registry password for content-digest lookups
    #[arg(long, env = "BERTH_REGISTRY_PASSWORD", hide_env_values = true)]
    pub registry_password: Option<String>,

    /// Talk to the registry over plain HTTP
    #[arg(long)]
    pub insecure_registry: bool,
}

/// Parse a human duration such as `90s` or `5m`
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

impl PipelineArgs {
    /// Build the pipeline request from berth.yaml and the flags
    pub fn request(
        &self,
        kube_context: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<DeployRequest> {
        let config = ProjectConfig::load(&self.dir)?;
        let settings = &config.deploy;
        let meta = config.meta();

        let env = self.env.clone().or_else(|| settings.env.clone());
        let tag_strategy = match &self.tag_strategy {
            Some(strategy) => strategy.parse::<TagStrategy>()?,
            None => settings.tag_strategy,
        };
        let release = self
            .release
            .clone()
            .or_else(|| settings.release.clone())
            .unwrap_or_else(|| meta.default_release(env.as_deref()));
        let namespace = self
            .namespace
            .clone()
            .or_else(|| settings.namespace.clone())
            .unwrap_or_else(|| meta.default_namespace(env.as_deref()));
        let images_repo = self
            .repo
            .clone()
            .or_else(|| settings.images_repo.clone())
            .unwrap_or_default();

        if images_repo.is_empty() && !config.images.is_empty() {
            return Err(CliError::usage_with_help(
                "no images repository configured",
                "pass --repo, set BERTH_REPO, or set deploy.imagesRepo in berth.yaml",
            ));
        }

        let options = DeployOptions {
            values: self.values.clone(),
            secret_values: self
                .secret_values
                .iter()
                .cloned()
                .map(SecretInput::File)
                .collect(),
            set: self.set.clone(),
            set_string: self.set_string.clone(),
            timeout: timeout.unwrap_or(settings.timeout),
            kube_context,
            env,
        };

        Ok(DeployRequest {
            project_dir: self.dir.clone(),
            images_repo,
            release,
            namespace,
            tag: self.tag.clone(),
            tag_strategy,
            config,
            options,
        })
    }

    /// Pipeline wired to the registry, the given engine and sink
    pub fn deployer(
        &self,
        engine: Arc<dyn ReleaseEngine>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Deployer> {
        let mut resolver = RegistryTagResolver::new();
        if let (Some(username), Some(password)) = (&self.registry_username, &self.registry_password)
        {
            resolver = resolver.with_basic_auth(username, password);
        }
        if self.insecure_registry {
            resolver = resolver.insecure();
        }

        let mut deployer = Deployer::new(Arc::new(resolver), engine).with_sink(sink);
        if let Some(tmp_dir) = &self.tmp_dir {
            deployer = deployer.with_tmp_root(tmp_dir);
        }
        if let Some(deadline) = self.deadline {
            deployer = deployer.with_deadline(deadline);
        }
        if let Some(key) = &self.secret_key {
            let backend = AesGcmBackend::from_hex_key(key)
                .map_err(|e| CliError::secret(format!("invalid secret key: {}", e)))?;
            deployer = deployer.with_secret_backend(Arc::new(backend));
        }
        Ok(deployer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert!(parse_duration("soon").is_err());
    }
}
