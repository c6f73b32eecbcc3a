use super::CommandContext;
use crate::kubectl::{KubectlClient, KubectlDiscovery, KubectlProbe};
use crate::render;
use anyhow::{Context, Result};
use linkctl_core::{Endpoint, EndpointDiscovery, ProgressReporter, ResumeSet, diagnose, load_records, save_records};
use std::sync::Arc;
use tracing::{info, warn};

/// Logs one line per finished (source, destination) step
struct LogProgress;

impl ProgressReporter for LogProgress {
    fn destination_done(&self, source: &Endpoint, destination: &Endpoint, completed: usize, total: usize) {
        info!("[{}/{}] {} -> {}", completed, total, source.node_name, destination.node_name);
    }
}

pub async fn run_check(ctx: &CommandContext) -> Result<()> {
    run(ctx, ResumeSet::new()).await
}

pub async fn run_resume(ctx: &CommandContext) -> Result<()> {
    let path = ctx.resume_path();
    let records = load_records(&path).context("Failed to load resume records")?;

    let resume = match records {
        Some(records) if !records.is_empty() => ResumeSet::from_records(&records),
        _ => {
            println!("No failed pairs recorded in {}, nothing to resume", path.display());
            return Ok(());
        }
    };

    info!("Resuming {} previously failed pairs", resume.len());
    run(ctx, resume).await
}

async fn run(ctx: &CommandContext, resume: ResumeSet) -> Result<()> {
    let config = &ctx.config;
    let plan = config.diagnosis_plan(resume)?;

    let source_client = KubectlClient::new(config.cluster.kubectl.clone(), config.cluster.src_kubeconfig.clone());
    let source = KubectlDiscovery::new(source_client.clone());
    let destination = config
        .cluster
        .dst_kubeconfig
        .clone()
        .map(|kubeconfig| KubectlDiscovery::new(KubectlClient::new(config.cluster.kubectl.clone(), Some(kubeconfig))));

    // Probes always execute inside the source cluster's agents
    let probe = Arc::new(KubectlProbe::new(source_client, config.cluster.namespace.clone(), config.cluster.container.clone()));

    let report = diagnose(
        &plan,
        &source,
        destination.as_ref().map(|d| d as &dyn EndpointDiscovery),
        probe,
        Arc::new(LogProgress),
    )
    .await?;

    render::print_report(&report)?;

    let resumable = report.resumable();
    save_records(&ctx.resume_path(), &resumable).context("Failed to save resume records")?;
    if resumable.is_empty() {
        info!("All pairs reachable");
    } else {
        warn!("{} pairs failed, run `linkctl resume` to re-check them", resumable.len());
    }

    config.save_to_file(ctx.last_check_path())?;
    Ok(())
}
