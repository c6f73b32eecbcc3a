// linkctl
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Matrix scheduler - walks the source x destination probe matrix
//!
//! Parallelism is per source endpoint: every source gets one worker task,
//! admitted by a counting semaphore sized to the job's concurrency limit.
//! A worker visits its destinations and their addresses strictly in order, so
//! results and progress reports of one source keep the destination order.
//! Different sources interleave freely.
//!
//! Every cell ends up either skipped (resume filter) or recorded exactly once.
//! Nothing a single cell does can abort the matrix.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregate::{MatrixReport, ResultSink};
use crate::classify::{ClassifiedResult, ProbeOutcome, classify};
use crate::endpoint::{Endpoint, Granularity};
use crate::probe::{ProbeError, ProbeExecutor, ProbeKind};
use crate::resume::{ResumeSet, should_skip};
use crate::rewrite::{AddressRewriteTable, translate};

pub const DEFAULT_MAX_CONCURRENCY: usize = 3;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Receives a notification each time a source finishes one destination
pub trait ProgressReporter: Send + Sync {
    fn destination_done(&self, source: &Endpoint, destination: &Endpoint, completed: usize, total: usize);
}

/// Progress reporter that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn destination_done(&self, _source: &Endpoint, _destination: &Endpoint, _completed: usize, _total: usize) {}
}

/// Parameters of one orchestration pass
#[derive(Debug, Clone)]
pub struct MatrixJob {
    pub sources: Vec<Endpoint>,
    pub destinations: Vec<Endpoint>,
    pub granularity: Granularity,
    pub probe_kind: ProbeKind,
    /// When present every destination address must translate
    pub rewrite: Option<AddressRewriteTable>,
    pub resume: ResumeSet,
    pub max_concurrency: usize,
    pub probe_timeout: Duration,
}

impl MatrixJob {
    pub fn new(sources: Vec<Endpoint>, destinations: Vec<Endpoint>) -> Self {
        Self {
            sources,
            destinations,
            granularity: Granularity::default(),
            probe_kind: ProbeKind::default(),
            rewrite: None,
            resume: ResumeSet::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_probe_kind(mut self, probe_kind: ProbeKind) -> Self {
        self.probe_kind = probe_kind;
        self
    }

    pub fn with_rewrite_table(mut self, rewrite: Option<AddressRewriteTable>) -> Self {
        self.rewrite = rewrite;
        self
    }

    pub fn with_resume(mut self, resume: ResumeSet) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Number of cells before resume filtering
    pub fn cell_count(&self) -> usize {
        let addresses: usize = self.destinations.iter().map(|d| d.addresses(self.granularity).len()).sum();
        self.sources.len() * addresses
    }
}

/// Read-only view of a job shared by all workers of one run
struct SharedPlan {
    destinations: Vec<Endpoint>,
    granularity: Granularity,
    probe_kind: ProbeKind,
    rewrite: Option<AddressRewriteTable>,
    resume: ResumeSet,
    probe_timeout: Duration,
    total_steps: usize,
    completed_steps: AtomicUsize,
}

/// Runs every cell of `job` and returns the classified results.
#[instrument(skip_all, fields(sources = job.sources.len(), destinations = job.destinations.len(), granularity = %job.granularity, probe = %job.probe_kind))]
pub async fn run_matrix<P>(probe: Arc<P>, job: &MatrixJob, progress: Arc<dyn ProgressReporter>) -> MatrixReport
where
    P: ProbeExecutor + ?Sized + 'static,
{
    if job.sources.is_empty() || job.destinations.is_empty() {
        info!("Empty probe matrix, nothing to run");
        return MatrixReport::default();
    }

    let limit = job.max_concurrency.max(1);
    info!(
        "Probing {} cells with up to {} concurrent sources{}",
        job.cell_count(),
        limit,
        if job.resume.is_empty() { "" } else { " (resume)" }
    );

    let plan = Arc::new(SharedPlan {
        destinations: job.destinations.clone(),
        granularity: job.granularity,
        probe_kind: job.probe_kind,
        rewrite: job.rewrite.clone(),
        resume: job.resume.clone(),
        probe_timeout: job.probe_timeout,
        total_steps: job.sources.len() * job.destinations.len(),
        completed_steps: AtomicUsize::new(0),
    });
    let sink = Arc::new(ResultSink::new());
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut workers = Vec::with_capacity(job.sources.len());

    for source in &job.sources {
        // Queue here until a worker slot frees up
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("Worker admission closed: {}", e);
                break;
            }
        };

        let source = source.clone();
        let plan = plan.clone();
        let sink = sink.clone();
        let probe = probe.clone();
        let progress = progress.clone();

        workers.push(tokio::spawn(async move {
            let _permit = permit;
            probe_from_source(probe.as_ref(), &source, &plan, &sink, progress.as_ref()).await;
        }));
    }

    for worker in workers {
        if let Err(e) = worker.await {
            error!("Matrix worker terminated abnormally: {}", e);
        }
    }

    let report = MatrixReport::new(sink.drain());
    let summary = report.summary();
    info!(
        "Matrix complete: {} succeeded, {} failed, {} errors",
        summary.succeeded, summary.probe_failed, summary.execution_errors
    );
    report
}

async fn probe_from_source<P>(probe: &P, source: &Endpoint, plan: &SharedPlan, sink: &ResultSink, progress: &dyn ProgressReporter)
where
    P: ProbeExecutor + ?Sized,
{
    for destination in &plan.destinations {
        for &address in destination.addresses(plan.granularity) {
            if let Some(result) = probe_cell(probe, source, destination, address, plan).await {
                sink.push(result);
            }
        }

        let completed = plan.completed_steps.fetch_add(1, Ordering::Relaxed) + 1;
        progress.destination_done(source, destination, completed, plan.total_steps);
    }
}

/// Drives one cell to completion. `None` means the cell was skipped.
async fn probe_cell<P>(probe: &P, source: &Endpoint, destination: &Endpoint, address: IpAddr, plan: &SharedPlan) -> Option<ClassifiedResult>
where
    P: ProbeExecutor + ?Sized,
{
    let target = match translate(address, plan.rewrite.as_ref()) {
        Ok(target) => target,
        Err(err) => {
            // Untranslatable cells are remembered under their original address
            if should_skip(source.source_key(), address, &plan.resume) {
                return None;
            }
            warn!("{} -> {}: {}", source.node_name, destination.node_name, err);
            return Some(ClassifiedResult::new(
                source.node_name.clone(),
                destination.node_name.clone(),
                address,
                ProbeOutcome::execution_error(err.to_string()),
            ));
        }
    };

    if should_skip(source.source_key(), target, &plan.resume) {
        debug!(source = %source.node_name, %target, "Skipping cell not in resume set");
        return None;
    }

    debug!(source = %source.node_name, destination = %destination.node_name, %target, "Dispatching probe");
    let raw = match tokio::time::timeout(plan.probe_timeout, probe.run_probe(source, target, plan.probe_kind, plan.probe_timeout)).await {
        Ok(raw) => raw,
        Err(_) => {
            warn!("Probe {} -> {} timed out after {:?}", source.node_name, target, plan.probe_timeout);
            Err(ProbeError::Timeout(plan.probe_timeout))
        }
    };

    Some(ClassifiedResult::new(source.node_name.clone(), destination.node_name.clone(), target, classify(raw)))
}
