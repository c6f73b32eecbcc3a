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

//! linkctl core - connectivity-matrix orchestration
//!
//! Probes every (source endpoint, destination address) pair of one or two
//! clusters with bounded concurrency, translating destination addresses that
//! sit behind another overlay, restricting re-runs to previously failed pairs,
//! and classifying every outcome as success, probe failure, or execution error.
//!
//! Endpoint discovery and the probe transport are supplied by the caller
//! through [`EndpointDiscovery`] and [`ProbeExecutor`].

pub mod aggregate;
pub mod classify;
pub mod diagnose;
pub mod discovery;
pub mod endpoint;
pub mod probe;
pub mod resume;
pub mod rewrite;
pub mod scheduler;

pub use aggregate::{MatrixReport, MatrixSummary, ResultSink, aggregate};
pub use classify::{ClassifiedResult, ProbeOutcome, ProbeStatus, classify};
pub use diagnose::{ClusterSide, DiagnoseError, DiagnosisPlan, diagnose};
pub use discovery::{DiscoveryError, EndpointDiscovery, discover};
pub use endpoint::{Endpoint, EndpointSelector, Granularity};
pub use probe::{ProbeError, ProbeExecutor, ProbeKind, ProbeReport};
pub use resume::{PersistError, ResumeSet, load_records, save_records, should_skip};
pub use rewrite::{AddressRewriteTable, NoMappingFound, NoMappingReason, RewriteRule, RewriteTableError, translate};
pub use scheduler::{MatrixJob, NoProgress, ProgressReporter, run_matrix};
