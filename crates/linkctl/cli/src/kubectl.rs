//! kubectl-backed discovery and probe execution
//!
//! Agents are listed with `kubectl get -o json`. Probes run as a `/bin/sh`
//! script streamed into the agent container through `kubectl exec -i`; the
//! script echoes the check's exit status on a marker line so the verdict
//! travels back in stdout.

use async_trait::async_trait;
use linkctl_core::{DiscoveryError, Endpoint, EndpointDiscovery, EndpointSelector, Granularity, ProbeError, ProbeExecutor, ProbeKind, ProbeReport};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

const EXIT_MARKER: &str = "linkctl-exit=";
const SHELL_NOT_EXECUTABLE: i32 = 126;
const SHELL_NOT_FOUND: i32 = 127;

#[derive(Debug, Clone)]
pub struct KubectlClient {
    binary: String,
    kubeconfig: Option<PathBuf>,
}

impl KubectlClient {
    pub fn new(binary: impl Into<String>, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig,
        }
    }

    fn command(&self, namespace: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.arg("--namespace").arg(namespace);
        cmd.kill_on_drop(true);
        cmd
    }

    async fn get_json<T: DeserializeOwned>(&self, namespace: &str, args: &[&str]) -> Result<T, DiscoveryError> {
        let output = self
            .command(namespace)
            .arg("get")
            .args(args)
            .args(["-o", "json"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DiscoveryError::Backend(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(DiscoveryError::Backend(format!(
                "kubectl get {} failed ({}): {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| DiscoveryError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub node_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodStatus {
    #[serde(rename = "podIP")]
    pub pod_ip: Option<String>,
    #[serde(rename = "podIPs", default)]
    pub pod_ips: Vec<PodIp>,
}

#[derive(Debug, Deserialize)]
pub struct PodIp {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

#[derive(Debug, Deserialize)]
pub struct Node {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
}

#[derive(Debug, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
}

fn parse_addresses<'a>(owner: &str, raw: impl Iterator<Item = &'a str>) -> Vec<IpAddr> {
    raw.filter_map(|s| match s.parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            warn!("Ignoring unparseable address {:?} of {}", s, owner);
            None
        }
    })
    .collect()
}

fn scheduled(pods: PodList) -> impl Iterator<Item = Pod> {
    pods.items.into_iter().filter(|pod| {
        if pod.spec.node_name.is_empty() {
            warn!("Agent {} is not scheduled yet, leaving it out", pod.metadata.name);
            return false;
        }
        true
    })
}

/// One workload endpoint per scheduled agent pod
pub fn workload_endpoints(pods: PodList) -> Vec<Endpoint> {
    scheduled(pods)
        .map(|pod| {
            let raw: Vec<&str> = if pod.status.pod_ips.is_empty() {
                pod.status.pod_ip.as_deref().into_iter().collect()
            } else {
                pod.status.pod_ips.iter().map(|p| p.ip.as_str()).collect()
            };
            let addresses = parse_addresses(&pod.metadata.name, raw.into_iter());
            Endpoint::workload(pod.spec.node_name.clone(), pod.metadata.name.clone(), addresses)
        })
        .collect()
}

/// One node endpoint per scheduled agent pod, addressed by its node's internal IPs
pub fn node_endpoints(pods: PodList, nodes: &NodeList) -> Vec<Endpoint> {
    scheduled(pods)
        .filter_map(|pod| {
            let Some(node) = nodes.items.iter().find(|n| n.metadata.name == pod.spec.node_name) else {
                warn!("Node {} of agent {} is not listed, leaving it out", pod.spec.node_name, pod.metadata.name);
                return None;
            };
            let raw = node.status.addresses.iter().filter(|a| a.kind == "InternalIP").map(|a| a.address.as_str());
            let addresses = parse_addresses(&node.metadata.name, raw);
            Some(Endpoint::node(node.metadata.name.clone(), pod.metadata.name.clone(), addresses))
        })
        .collect()
}

pub struct KubectlDiscovery {
    client: KubectlClient,
}

impl KubectlDiscovery {
    pub fn new(client: KubectlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EndpointDiscovery for KubectlDiscovery {
    async fn list_endpoints(&self, selector: &EndpointSelector, granularity: Granularity) -> Result<Vec<Endpoint>, DiscoveryError> {
        let labels = selector.label_query();
        let pods: PodList = self.client.get_json(&selector.namespace, &["pods", "--selector", labels.as_str()]).await?;
        debug!("Found {} agent pods in {}", pods.items.len(), selector.namespace);

        match granularity {
            Granularity::Workload => Ok(workload_endpoints(pods)),
            Granularity::Node => {
                let nodes: NodeList = self.client.get_json(&selector.namespace, &["nodes"]).await?;
                if nodes.items.is_empty() {
                    return Err(DiscoveryError::Backend("unable to list any node".to_string()));
                }
                Ok(node_endpoints(pods, &nodes))
            }
        }
    }
}

/// Shell script run inside the agent for one probe
pub fn probe_script(target: IpAddr, kind: ProbeKind, timeout: Duration) -> String {
    // Leave headroom for the exec round trip inside the overall timeout
    let wait = timeout.as_secs().saturating_sub(1).max(1);
    let check = match kind {
        ProbeKind::Ping => format!("ping -c 1 -W {} {}", wait, target),
        ProbeKind::Tcp { port } => format!("nc -z -w {} {} {}", wait, target, port),
        ProbeKind::Udp { port } => format!("nc -z -u -w {} {} {}", wait, target, port),
    };
    format!("{} 2>&1; echo \"{}$?\"\n", check, EXIT_MARKER)
}

/// Interprets the output of a probe script
pub fn parse_probe_output(stdout: &str, stderr: &str, exec_succeeded: bool) -> Result<ProbeReport, ProbeError> {
    let exit_code = stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(EXIT_MARKER))
        .map(|code| code.trim().parse::<i32>());

    let output: Vec<&str> = stdout.lines().filter(|line| !line.trim().starts_with(EXIT_MARKER)).collect();
    let output = output.join("\n").trim().to_string();

    match exit_code {
        Some(Ok(0)) => Ok(ProbeReport::reachable(output)),
        // Shell status for a check that never started
        Some(Ok(code @ (SHELL_NOT_EXECUTABLE | SHELL_NOT_FOUND))) => Err(ProbeError::Agent(format!("check command failed to start ({}): {}", code, output))),
        Some(Ok(_)) => Ok(ProbeReport::unreachable(output)),
        Some(Err(e)) => Err(ProbeError::Agent(format!("malformed exit status: {}", e))),
        None if !exec_succeeded => Err(ProbeError::Transport(format!("exec failed: {}", stderr.trim()))),
        None => Err(ProbeError::Agent(format!("probe reported no exit status, stderr: {}", stderr.trim()))),
    }
}

/// Streams the script into the exec session. A closed pipe is not an error
/// here: kubectl exited early and its stderr, collected afterwards, says why.
async fn feed_script<W: AsyncWrite + Unpin>(mut stdin: W, script: &str) -> Result<(), ProbeError> {
    let written = match stdin.write_all(script.as_bytes()).await {
        Ok(()) => stdin.shutdown().await,
        Err(e) => Err(e),
    };
    match written {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("kubectl closed stdin before reading the script");
            Ok(())
        }
        Err(e) => Err(ProbeError::Transport(e.to_string())),
    }
}

pub struct KubectlProbe {
    client: KubectlClient,
    namespace: String,
    container: String,
}

impl KubectlProbe {
    pub fn new(client: KubectlClient, namespace: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            container: container.into(),
        }
    }
}

#[async_trait]
impl ProbeExecutor for KubectlProbe {
    async fn run_probe(&self, endpoint: &Endpoint, target: IpAddr, kind: ProbeKind, timeout: Duration) -> Result<ProbeReport, ProbeError> {
        let script = probe_script(target, kind, timeout);

        let mut child = self
            .client
            .command(&self.namespace)
            .args(["exec", "-i", &endpoint.workload_name, "-c", &self.container, "--", "/bin/sh"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(stdin) = child.stdin.take() {
            feed_script(stdin, &script).await?;
        }

        let output = child.wait_with_output().await.map_err(|e| ProbeError::Transport(e.to_string()))?;
        parse_probe_output(&String::from_utf8_lossy(&output.stdout), &String::from_utf8_lossy(&output.stderr), output.status.success())
    }
}
