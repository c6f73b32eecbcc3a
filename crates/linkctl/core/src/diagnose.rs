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

//! Diagnosis driver - picks the run mode, discovers both sides, and hands
//! the resulting matrix to the scheduler

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregate::MatrixReport;
use crate::discovery::{DiscoveryError, EndpointDiscovery, discover};
use crate::endpoint::{EndpointSelector, Granularity};
use crate::probe::{ProbeExecutor, ProbeKind};
use crate::resume::ResumeSet;
use crate::rewrite::AddressRewriteTable;
use crate::scheduler::{DEFAULT_MAX_CONCURRENCY, DEFAULT_PROBE_TIMEOUT, MatrixJob, ProgressReporter, run_matrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSide {
    Source,
    Destination,
}

impl fmt::Display for ClusterSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterSide::Source => write!(f, "source"),
            ClusterSide::Destination => write!(f, "destination"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DiagnoseError {
    #[error("Failed to discover {side} cluster endpoints: {source}")]
    Discovery {
        side: ClusterSide,
        #[source]
        source: DiscoveryError,
    },
}

/// Everything a diagnosis run needs besides its collaborators
#[derive(Debug, Clone)]
pub struct DiagnosisPlan {
    pub selector: EndpointSelector,
    pub granularity: Granularity,
    pub probe_kind: ProbeKind,
    /// Rewrite table of the destination cluster
    pub rewrite: Option<AddressRewriteTable>,
    pub resume: ResumeSet,
    pub max_concurrency: usize,
    pub probe_timeout: Duration,
}

impl DiagnosisPlan {
    pub fn new(selector: EndpointSelector) -> Self {
        Self {
            selector,
            granularity: Granularity::default(),
            probe_kind: ProbeKind::default(),
            rewrite: None,
            resume: ResumeSet::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Runs one diagnosis.
///
/// Without a destination cluster the source cluster is probed against
/// itself and nothing is translated. Across clusters, workload addresses of
/// the destination go through the rewrite table (when one is configured);
/// node addresses live on the underlay and are probed as-is.
pub async fn diagnose<P>(
    plan: &DiagnosisPlan,
    source: &dyn EndpointDiscovery,
    destination: Option<&dyn EndpointDiscovery>,
    probe: Arc<P>,
    progress: Arc<dyn ProgressReporter>,
) -> Result<MatrixReport, DiagnoseError>
where
    P: ProbeExecutor + ?Sized + 'static,
{
    let sources = discover(source, &plan.selector, plan.granularity).await.map_err(|err| DiagnoseError::Discovery {
        side: ClusterSide::Source,
        source: err,
    })?;

    let (destinations, rewrite) = match destination {
        Some(destination) => {
            let destinations = discover(destination, &plan.selector, plan.granularity)
                .await
                .map_err(|err| DiagnoseError::Discovery {
                    side: ClusterSide::Destination,
                    source: err,
                })?;
            let rewrite = match plan.granularity {
                Granularity::Workload => plan.rewrite.clone(),
                Granularity::Node => None,
            };
            info!("Cross-cluster diagnosis: {} sources, {} destinations", sources.len(), destinations.len());
            (destinations, rewrite)
        }
        None => {
            if plan.rewrite.is_some() {
                debug!("Ignoring rewrite table for single-cluster diagnosis");
            }
            info!("Single-cluster diagnosis: {} endpoints", sources.len());
            (sources.clone(), None)
        }
    };

    let job = MatrixJob::new(sources, destinations)
        .with_granularity(plan.granularity)
        .with_probe_kind(plan.probe_kind)
        .with_rewrite_table(rewrite)
        .with_resume(plan.resume.clone())
        .with_max_concurrency(plan.max_concurrency)
        .with_probe_timeout(plan.probe_timeout);

    Ok(run_matrix(probe, &job, progress).await)
}
