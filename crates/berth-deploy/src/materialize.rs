//! Chart materialization into a private temporary directory

use berth_core::chart::{CHART_FILE, VALUES_FILE};
use berth_core::{ChartMetadata, ChartSource, SecretDocument, Values, slugify};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{CleanupError, DeployError};
use crate::service_values::ServiceValues;

/// Prefix length kept from the project name in directory names
const MAX_PREFIX_LEN: usize = 40;

/// A fully written chart, exclusively owned by one deploy call
///
/// The directory is deleted by [`MaterializedChart::release`], or on drop if
/// the handle is never released (for example when the deploy future is
/// cancelled).
#[derive(Debug)]
pub struct MaterializedChart {
    dir: TempDir,
    values: Values,
    metadata: ChartMetadata,
}

impl MaterializedChart {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Merged values written to the chart's `values.yaml`
    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn metadata(&self) -> &ChartMetadata {
        &self.metadata
    }

    /// Delete the directory, reporting failure instead of ignoring it
    pub fn release(self) -> Result<(), CleanupError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| CleanupError { path, source })
    }
}

/// Writes charts under a shared temporary root
#[derive(Debug, Clone)]
pub struct ChartMaterializer {
    tmp_root: PathBuf,
}

impl ChartMaterializer {
    pub fn new(tmp_root: impl Into<PathBuf>) -> Self {
        Self {
            tmp_root: tmp_root.into(),
        }
    }

    pub fn tmp_root(&self) -> &Path {
        &self.tmp_root
    }

    /// Copy the chart and write its values
    ///
    /// `values.yaml` is chart defaults < service values < secrets. On error
    /// nothing is left under the temporary root.
    pub fn materialize(
        &self,
        chart: &ChartSource,
        project: &str,
        secrets: &SecretDocument,
        service: &ServiceValues,
    ) -> Result<MaterializedChart, DeployError> {
        fs::create_dir_all(&self.tmp_root)
            .map_err(|e| DeployError::chart_prep(&self.tmp_root, e))?;

        let prefix = format!("{}-", slugify(project, MAX_PREFIX_LEN));
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .rand_bytes(6)
            .tempdir_in(&self.tmp_root)
            .map_err(|e| DeployError::chart_prep(&self.tmp_root, e))?;

        match populate(dir.path(), chart, project, secrets, service) {
            Ok((values, metadata)) => {
                tracing::debug!(path = %dir.path().display(), "materialized chart");
                Ok(MaterializedChart {
                    dir,
                    values,
                    metadata,
                })
            }
            Err(e) => {
                let path = dir.path().to_path_buf();
                if let Err(cleanup) = dir.close() {
                    tracing::warn!(
                        path = %path.display(),
                        error = %cleanup,
                        "failed to remove partial chart"
                    );
                }
                Err(e)
            }
        }
    }
}

fn populate(
    dest: &Path,
    chart: &ChartSource,
    project: &str,
    secrets: &SecretDocument,
    service: &ServiceValues,
) -> Result<(Values, ChartMetadata), DeployError> {
    copy_chart(&chart.root, dest)?;

    let metadata = chart.metadata_or_default(project);
    if chart.metadata.is_none() {
        let content = serde_yaml::to_string(&metadata)
            .map_err(|e| DeployError::chart_prep(dest.join(CHART_FILE), e))?;
        fs::write(dest.join(CHART_FILE), content)
            .map_err(|e| DeployError::chart_prep(dest.join(CHART_FILE), e))?;
    }

    let mut values = chart
        .default_values()
        .map_err(|e| DeployError::chart_prep(chart.root.join(VALUES_FILE), e))?;
    values.merge(service.values());
    let secret_values = secrets
        .to_values()
        .map_err(|e| DeployError::chart_prep(dest.join(VALUES_FILE), e))?;
    values.merge(&secret_values);

    let yaml = values
        .to_yaml()
        .map_err(|e| DeployError::chart_prep(dest.join(VALUES_FILE), e))?;
    fs::write(dest.join(VALUES_FILE), yaml)
        .map_err(|e| DeployError::chart_prep(dest.join(VALUES_FILE), e))?;

    Ok((values, metadata))
}

/// Copy chart files unmodified, skipping defaults and secret material
fn copy_chart(src: &Path, dest: &Path) -> Result<(), DeployError> {
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            entry
                .path()
                .strip_prefix(src)
                .map(ChartSource::is_copied)
                .unwrap_or(false)
        });

    for entry in walker {
        let entry = entry.map_err(|e| DeployError::chart_prep(src, e))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| DeployError::chart_prep(entry.path(), e))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| DeployError::chart_prep(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| DeployError::chart_prep(parent, e))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| DeployError::chart_prep(entry.path(), e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_values::{ServiceValuesInput, compose_service_values};
    use berth_core::{ImageReference, ProjectMeta, TagStrategy};
    use secrecy::SecretString;
    use std::collections::BTreeMap;

    fn create_chart(with_metadata: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        if with_metadata {
            fs::write(
                root.join(CHART_FILE),
                "apiVersion: v2\nname: demo\nversion: 1.0.0\n",
            )
            .unwrap();
        }
        fs::write(root.join(VALUES_FILE), "replicas: 1\nnamespace: chart-default\n").unwrap();
        fs::write(root.join("secret-values.yaml"), "token: deadbeef\n").unwrap();
        fs::create_dir_all(root.join("secret")).unwrap();
        fs::write(root.join("secret/tls.key"), "encrypted").unwrap();
        fs::create_dir_all(root.join("templates")).unwrap();
        fs::write(root.join("templates/deployment.yaml"), "kind: Deployment\n").unwrap();
        dir
    }

    fn service_values() -> ServiceValues {
        let meta = ProjectMeta::new("demo");
        let images = BTreeMap::from([(
            "web".to_string(),
            ImageReference::tagged("web", "registry.example.com/demo/web", "abc123"),
        )]);
        compose_service_values(&ServiceValuesInput {
            meta: &meta,
            images_repo: "registry.example.com/demo",
            namespace: "staging",
            tag: "abc123",
            tag_strategy: TagStrategy::Custom,
            images: &images,
            env: None,
        })
        .unwrap()
    }

    fn secrets() -> SecretDocument {
        let mut doc = SecretDocument::new();
        doc.insert("db.password", SecretString::from("hunter2"));
        doc
    }

    #[test]
    fn test_materialize_layout() {
        let chart_dir = create_chart(true);
        let root = TempDir::new().unwrap();
        let chart = ChartSource::load(chart_dir.path()).unwrap();

        let materialized = ChartMaterializer::new(root.path())
            .materialize(&chart, "demo", &secrets(), &service_values())
            .unwrap();
        let path = materialized.path().to_path_buf();

        assert!(path.starts_with(root.path()));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("demo-"));
        assert!(path.join("templates/deployment.yaml").is_file());
        assert!(path.join(CHART_FILE).is_file());
        assert!(!path.join("secret-values.yaml").exists());
        assert!(!path.join("secret").exists());

        let written = Values::from_file(path.join(VALUES_FILE)).unwrap();
        assert_eq!(&written, materialized.values());
        assert_eq!(written.get("replicas").unwrap(), 1);
        assert_eq!(written.get("namespace").unwrap(), "staging");
        assert_eq!(written.get("db.password").unwrap(), "hunter2");

        materialized.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_secrets_override_service_values() {
        let chart_dir = create_chart(true);
        let root = TempDir::new().unwrap();
        let chart = ChartSource::load(chart_dir.path()).unwrap();
        let mut doc = SecretDocument::new();
        doc.insert("namespace", SecretString::from("from-secret"));

        let materialized = ChartMaterializer::new(root.path())
            .materialize(&chart, "demo", &doc, &service_values())
            .unwrap();
        assert_eq!(materialized.values().get("namespace").unwrap(), "from-secret");
    }

    #[test]
    fn test_generates_chart_metadata() {
        let chart_dir = create_chart(false);
        let root = TempDir::new().unwrap();
        let chart = ChartSource::load(chart_dir.path()).unwrap();

        let materialized = ChartMaterializer::new(root.path())
            .materialize(&chart, "demo", &SecretDocument::new(), &service_values())
            .unwrap();

        let generated = ChartSource::load(materialized.path()).unwrap();
        let metadata = generated.metadata.unwrap();
        assert_eq!(metadata.name, "demo");
        assert_eq!(metadata.version.to_string(), "0.1.0");
    }

    #[test]
    fn test_identical_inputs_give_identical_values_files() {
        let chart_dir = create_chart(true);
        let chart = ChartSource::load(chart_dir.path()).unwrap();
        let (root_a, root_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());

        let a = ChartMaterializer::new(root_a.path())
            .materialize(&chart, "demo", &secrets(), &service_values())
            .unwrap();
        let b = ChartMaterializer::new(root_b.path())
            .materialize(&chart, "demo", &secrets(), &service_values())
            .unwrap();

        assert_eq!(
            fs::read(a.path().join(VALUES_FILE)).unwrap(),
            fs::read(b.path().join(VALUES_FILE)).unwrap()
        );
    }

    #[test]
    fn test_concurrent_materializations_do_not_collide() {
        let chart_dir = create_chart(true);
        let chart = ChartSource::load(chart_dir.path()).unwrap();
        let root = TempDir::new().unwrap();
        let materializer = ChartMaterializer::new(root.path());

        let charts: Vec<_> = (0..8)
            .map(|_| {
                materializer
                    .materialize(&chart, "demo", &secrets(), &service_values())
                    .unwrap()
            })
            .collect();

        let mut paths: Vec<_> = charts.iter().map(|c| c.path().to_path_buf()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }

    #[test]
    fn test_failure_leaves_nothing_behind() {
        let chart_dir = create_chart(true);
        fs::write(chart_dir.path().join(VALUES_FILE), "- not\n- a mapping\n").unwrap();
        let chart = ChartSource::load(chart_dir.path()).unwrap();
        let root = TempDir::new().unwrap();

        let err = ChartMaterializer::new(root.path())
            .materialize(&chart, "demo", &secrets(), &service_values())
            .unwrap_err();

        assert!(matches!(err, DeployError::ChartPrep { .. }));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
