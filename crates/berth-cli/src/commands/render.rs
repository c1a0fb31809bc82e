//! Render command - run the pipeline against a local renderer instead of a cluster

use async_trait::async_trait;
use berth_deploy::{EngineFailure, EngineReport, EngineRequest, ReleaseEngine};
use berth_engine::RenderResult;
use berth_kube::KubeEngine;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use super::PipelineArgs;
use crate::display::ConsoleSink;
use crate::error::{CliError, Result};

/// Renders the materialized chart and keeps the result
#[derive(Default)]
struct LocalRenderer {
    engine: KubeEngine,
    rendered: Mutex<Option<RenderResult>>,
}

impl LocalRenderer {
    fn take(&self) -> Option<RenderResult> {
        self.rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl ReleaseEngine for LocalRenderer {
    async fn apply(
        &self,
        request: &EngineRequest,
    ) -> std::result::Result<EngineReport, EngineFailure> {
        let rendered = self
            .engine
            .render(request)
            .map_err(|e| EngineFailure::Apply(e.to_string()))?;

        let report = EngineReport {
            resources: rendered.manifests.keys().cloned().collect(),
            notes: rendered.notes.clone(),
        };
        *self.rendered.lock().unwrap_or_else(PoisonError::into_inner) = Some(rendered);
        Ok(report)
    }
}

pub async fn run(args: &PipelineArgs, output_dir: Option<&Path>) -> Result<()> {
    let request = args.request(None, None)?;
    let renderer = Arc::new(LocalRenderer::default());
    let deployer = args.deployer(renderer.clone(), Arc::new(ConsoleSink::new()))?;

    deployer.deploy(request).await?;
    let rendered = renderer
        .take()
        .ok_or_else(|| CliError::internal("renderer produced no output"))?;

    match output_dir {
        Some(dir) => {
            for (name, content) in &rendered.manifests {
                let path = dir.join(name);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, content)?;
            }
            if let Some(notes) = &rendered.notes {
                fs::write(dir.join("NOTES.txt"), notes)?;
            }
        }
        None => print!("{}", rendered.to_stream()),
    }
    Ok(())
}
