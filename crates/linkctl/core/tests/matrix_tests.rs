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

//! Integration tests for the connectivity matrix
//!
//! These drive the scheduler and the diagnosis driver end to end against
//! in-memory discovery and probe fakes.

use async_trait::async_trait;
use linkctl_core::{
    AddressRewriteTable, ClassifiedResult, ClusterSide, DiagnoseError, DiagnosisPlan, DiscoveryError, Endpoint, EndpointDiscovery, EndpointSelector,
    Granularity, MatrixJob, NoProgress, ProbeError, ProbeExecutor, ProbeKind, ProbeReport, ProbeStatus, ResumeSet, aggregate, diagnose, run_matrix,
};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Probe fake recording every dispatched cell and the peak concurrency
#[derive(Default)]
struct FakeProbe {
    unreachable: bool,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<(String, IpAddr)>>,
}

impl FakeProbe {
    fn reachable() -> Self {
        Self::default()
    }

    fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    fn calls(&self) -> Vec<(String, IpAddr)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProbeExecutor for FakeProbe {
    async fn run_probe(&self, endpoint: &Endpoint, target: IpAddr, _kind: ProbeKind, _timeout: Duration) -> Result<ProbeReport, ProbeError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        self.calls.lock().unwrap().push((endpoint.node_name.clone(), target));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.unreachable {
            Ok(ProbeReport::unreachable("1 packets transmitted, 0 received"))
        } else {
            Ok(ProbeReport::reachable("1 packets transmitted, 1 received"))
        }
    }
}

struct StaticDiscovery {
    endpoints: Vec<Endpoint>,
}

#[async_trait]
impl EndpointDiscovery for StaticDiscovery {
    async fn list_endpoints(&self, _selector: &EndpointSelector, _granularity: Granularity) -> Result<Vec<Endpoint>, DiscoveryError> {
        Ok(self.endpoints.clone())
    }
}

struct BrokenDiscovery;

#[async_trait]
impl EndpointDiscovery for BrokenDiscovery {
    async fn list_endpoints(&self, _selector: &EndpointSelector, _granularity: Granularity) -> Result<Vec<Endpoint>, DiscoveryError> {
        Err(DiscoveryError::Backend("connection refused".to_string()))
    }
}

fn scenario_sources() -> Vec<Endpoint> {
    vec![
        Endpoint::workload("S1", "agent-s1", vec![ip("10.0.0.1")]),
        Endpoint::workload("S2", "agent-s2", vec![ip("10.0.0.2")]),
    ]
}

fn scenario_destinations() -> Vec<Endpoint> {
    vec![Endpoint::workload("D1", "agent-d1", vec![ip("172.16.0.5")])]
}

fn scenario_table() -> AddressRewriteTable {
    AddressRewriteTable::from_cidr_pairs([("172.16.0.0/16", "10.0.0.0/16")]).unwrap()
}

fn scenario_job() -> MatrixJob {
    MatrixJob::new(scenario_sources(), scenario_destinations())
        .with_rewrite_table(Some(scenario_table()))
        .with_max_concurrency(2)
}

#[tokio::test]
async fn test_cross_cluster_targets_are_translated() {
    let probe = Arc::new(FakeProbe::reachable());
    let report = run_matrix(probe.clone(), &scenario_job(), Arc::new(NoProgress)).await;

    assert_eq!(report.results().len(), 2);
    let targets: HashSet<_> = probe.calls().into_iter().map(|(_, target)| target).collect();
    assert_eq!(targets, HashSet::from([ip("10.0.0.5")]));
    for result in report.results() {
        assert_eq!(result.dest_node, "D1");
        assert_eq!(result.target_address, ip("10.0.0.5"));
        assert_eq!(result.status, ProbeStatus::Success);
    }
}

#[tokio::test]
async fn test_unreachable_targets_are_resumable() {
    let probe = Arc::new(FakeProbe::unreachable());
    let report = run_matrix(probe, &scenario_job(), Arc::new(NoProgress)).await;

    assert!(report.results().iter().all(|r| r.status == ProbeStatus::ProbeFailed));
    let (all, resumable) = aggregate(report.into_results());
    assert_eq!(all.len(), 2);
    assert_eq!(resumable.len(), 2);
}

#[tokio::test]
async fn test_resume_only_dispatches_remembered_pairs() {
    let mut resume = ResumeSet::new();
    resume.insert("S1", ip("10.0.0.5"));

    let probe = Arc::new(FakeProbe::reachable());
    let job = scenario_job().with_resume(resume);
    let report = run_matrix(probe.clone(), &job, Arc::new(NoProgress)).await;

    assert_eq!(probe.calls(), vec![("S1".to_string(), ip("10.0.0.5"))]);
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].source_node, "S1");
}

#[tokio::test]
async fn test_resume_from_previous_failures() {
    let first = run_matrix(Arc::new(FakeProbe::unreachable()), &scenario_job(), Arc::new(NoProgress)).await;
    let resumable: Vec<ClassifiedResult> = first.resumable();

    let job = scenario_job().with_resume(ResumeSet::from_records(&resumable));
    let second = run_matrix(Arc::new(FakeProbe::reachable()), &job, Arc::new(NoProgress)).await;

    let pairs: HashSet<_> = second.results().iter().map(|r| (r.source_node.clone(), r.target_address)).collect();
    let expected: HashSet<_> = resumable.iter().map(|r| (r.source_node.clone(), r.target_address)).collect();
    assert_eq!(pairs, expected);
    assert!(second.resumable().is_empty());
}

#[tokio::test]
async fn test_fresh_run_covers_full_matrix() {
    let sources: Vec<_> = (0..4).map(|i| Endpoint::workload(format!("src-{}", i), format!("agent-{}", i), vec![ip(&format!("10.1.0.{}", i + 1))])).collect();
    let destinations = vec![
        Endpoint::workload("dst-a", "agent-a", vec![ip("10.2.0.1"), ip("fd00::1")]),
        Endpoint::workload("dst-b", "agent-b", vec![ip("10.2.0.2")]),
        Endpoint::workload("dst-c", "agent-c", vec![ip("10.2.0.3"), ip("10.2.0.4"), ip("10.2.0.5")]),
    ];
    let job = MatrixJob::new(sources, destinations).with_max_concurrency(2);
    assert_eq!(job.cell_count(), 24);

    let report = run_matrix(Arc::new(FakeProbe::reachable()), &job, Arc::new(NoProgress)).await;
    assert_eq!(report.results().len(), 24);

    // Within one source, results follow destination then address order
    let order: Vec<_> = report.results().iter().filter(|r| r.source_node == "src-2").map(|r| r.target_address).collect();
    assert_eq!(order, vec![ip("10.2.0.1"), ip("fd00::1"), ip("10.2.0.2"), ip("10.2.0.3"), ip("10.2.0.4"), ip("10.2.0.5")]);
}

#[tokio::test]
async fn test_untranslatable_cells_count_once() {
    let destinations = vec![Endpoint::workload("D1", "agent-d1", vec![ip("172.16.0.5"), ip("192.168.0.9")])];
    let job = MatrixJob::new(scenario_sources(), destinations).with_rewrite_table(Some(scenario_table()));
    let probe = Arc::new(FakeProbe::reachable());
    let report = run_matrix(probe.clone(), &job, Arc::new(NoProgress)).await;

    assert_eq!(report.results().len(), 4);
    assert_eq!(probe.calls().len(), 2);
    let summary = report.summary();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.execution_errors, 2);
    assert_eq!(report.resumable().len(), summary.total() - summary.succeeded);
}

#[tokio::test]
async fn test_resume_retries_untranslatable_pairs_by_original_address() {
    let destinations = vec![Endpoint::workload("D1", "agent-d1", vec![ip("192.168.7.7")])];
    let mut resume = ResumeSet::new();
    resume.insert("S1", ip("192.168.7.7"));

    let job = MatrixJob::new(scenario_sources(), destinations).with_rewrite_table(Some(scenario_table())).with_resume(resume);
    let probe = Arc::new(FakeProbe::reachable());
    let report = run_matrix(probe.clone(), &job, Arc::new(NoProgress)).await;

    assert!(probe.calls().is_empty());
    assert_eq!(report.results().len(), 1);
    let result = &report.results()[0];
    assert_eq!(result.source_node, "S1");
    assert_eq!(result.target_address, ip("192.168.7.7"));
    assert_eq!(result.status, ProbeStatus::ExecutionError);
    assert!(report.results().iter().all(|r| r.source_node != "S2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_limit() {
    let sources: Vec<_> = (0..8).map(|i| Endpoint::workload(format!("src-{}", i), format!("agent-{}", i), vec![ip(&format!("10.1.0.{}", i + 1))])).collect();
    let destinations = vec![
        Endpoint::workload("dst-a", "agent-a", vec![ip("10.2.0.1")]),
        Endpoint::workload("dst-b", "agent-b", vec![ip("10.2.0.2")]),
    ];
    let probe = Arc::new(FakeProbe::slow(Duration::from_millis(20)));
    let job = MatrixJob::new(sources, destinations).with_max_concurrency(3).with_probe_timeout(Duration::from_secs(5));

    let report = run_matrix(probe.clone(), &job, Arc::new(NoProgress)).await;

    assert_eq!(report.results().len(), 16);
    let peak = probe.peak.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak concurrency {} exceeds limit", peak);
}

#[tokio::test]
async fn test_single_cluster_diagnosis_probes_itself() {
    let endpoints = scenario_sources();
    let discovery = StaticDiscovery { endpoints };
    let mut plan = DiagnosisPlan::new(EndpointSelector::new("kosmos-system").with_label("app", "clusterlink-floater"));
    plan.rewrite = Some(scenario_table());

    let probe = Arc::new(FakeProbe::reachable());
    let report = diagnose(&plan, &discovery, None, probe.clone(), Arc::new(NoProgress)).await.unwrap();

    // 2 sources x 2 addresses, untranslated
    assert_eq!(report.results().len(), 4);
    let targets: HashSet<_> = probe.calls().into_iter().map(|(_, target)| target).collect();
    assert_eq!(targets, HashSet::from([ip("10.0.0.1"), ip("10.0.0.2")]));
}

#[tokio::test]
async fn test_cross_cluster_diagnosis_translates_workloads() {
    let source = StaticDiscovery { endpoints: scenario_sources() };
    let destination = StaticDiscovery {
        endpoints: scenario_destinations(),
    };
    let mut plan = DiagnosisPlan::new(EndpointSelector::new("kosmos-system"));
    plan.rewrite = Some(scenario_table());

    let report = diagnose(&plan, &source, Some(&destination), Arc::new(FakeProbe::reachable()), Arc::new(NoProgress))
        .await
        .unwrap();
    assert!(report.results().iter().all(|r| r.target_address == ip("10.0.0.5")));
}

#[tokio::test]
async fn test_cross_cluster_node_diagnosis_skips_translation() {
    let source = StaticDiscovery {
        endpoints: vec![Endpoint::node("S1", "agent-s1", vec![ip("192.168.1.10")])],
    };
    let destination = StaticDiscovery {
        endpoints: vec![Endpoint::node("D1", "agent-d1", vec![ip("172.16.3.3")])],
    };
    let mut plan = DiagnosisPlan::new(EndpointSelector::new("kosmos-system"));
    plan.granularity = Granularity::Node;
    plan.rewrite = Some(scenario_table());

    let report = diagnose(&plan, &source, Some(&destination), Arc::new(FakeProbe::reachable()), Arc::new(NoProgress))
        .await
        .unwrap();
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].target_address, ip("172.16.3.3"));
    assert_eq!(report.results()[0].status, ProbeStatus::Success);
}

#[tokio::test]
async fn test_discovery_failure_is_fatal() {
    let source = StaticDiscovery { endpoints: scenario_sources() };
    let plan = DiagnosisPlan::new(EndpointSelector::new("kosmos-system"));

    let err = diagnose(&plan, &source, Some(&BrokenDiscovery), Arc::new(FakeProbe::reachable()), Arc::new(NoProgress))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DiagnoseError::Discovery {
            side: ClusterSide::Destination,
            source: DiscoveryError::Backend(_)
        }
    ));

    let empty = StaticDiscovery { endpoints: Vec::new() };
    let err = diagnose(&plan, &empty, None, Arc::new(FakeProbe::reachable()), Arc::new(NoProgress)).await.unwrap_err();
    assert!(matches!(
        err,
        DiagnoseError::Discovery {
            side: ClusterSide::Source,
            source: DiscoveryError::NoEndpoints { .. }
        }
    ));
}
