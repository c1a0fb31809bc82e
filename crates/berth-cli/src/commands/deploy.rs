//! Deploy command - resolve, compose, materialize and apply a release

use berth_kube::KubeEngine;
use std::sync::Arc;
use std::time::Duration;

use super::PipelineArgs;
use crate::display::{ConsoleSink, print_outcome};
use crate::error::Result;

pub async fn run(
    args: &PipelineArgs,
    kube_context: Option<String>,
    timeout: Option<Duration>,
) -> Result<()> {
    let request = args.request(kube_context, timeout)?;
    let deployer = args.deployer(Arc::new(KubeEngine::new()), Arc::new(ConsoleSink::new()))?;

    let outcome = deployer.deploy(request).await?;
    print_outcome(&outcome);
    Ok(())
}
