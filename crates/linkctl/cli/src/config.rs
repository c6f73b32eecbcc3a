use anyhow::{Context, Result, bail};
use linkctl_core::{AddressRewriteTable, DiagnosisPlan, EndpointSelector, Granularity, ProbeKind, ResumeSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ProbeArgs;

pub const CONFIG_FILE: &str = "config.toml";
pub const LAST_CHECK_FILE: &str = "last-check.toml";
pub const RESUME_FILE: &str = "resume.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ping,
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkctlConfig {
    pub data_dir: PathBuf,
    pub cluster: ClusterConfig,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub namespace: String,
    pub agent_name: String,
    pub container: String,
    pub kubectl: String,
    pub src_kubeconfig: Option<PathBuf>,
    pub dst_kubeconfig: Option<PathBuf>,
    /// Destination cluster CIDR -> CIDR reachable from the source cluster
    pub cidr_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub host_network: bool,
    pub protocol: Protocol,
    pub port: u16,
    pub max_concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for LinkctlConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cluster: ClusterConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: "kosmos-system".to_string(),
            agent_name: "clusterlink-floater".to_string(),
            container: "floater".to_string(),
            kubectl: "kubectl".to_string(),
            src_kubeconfig: None,
            dst_kubeconfig: None,
            cidr_map: BTreeMap::new(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host_network: false,
            protocol: Protocol::Ping,
            port: 8889,
            max_concurrency: 3,
            timeout_secs: 3,
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("linkctl")
}

impl LinkctlConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    /// Resolves the effective configuration.
    ///
    /// Order: `--config`, `$LINKCTL_CONFIG`, the options of the last check
    /// (resume only), `<data_dir>/config.toml`, built-in defaults.
    pub fn resolve_config(cli_config: Option<PathBuf>, cli_data_dir: Option<PathBuf>, prefer_last_check: bool) -> Result<Self> {
        let data_dir_override = cli_data_dir.or_else(|| std::env::var_os("LINKCTL_DATA_DIR").map(PathBuf::from));
        let data_dir = data_dir_override.clone().unwrap_or_else(default_data_dir);

        let mut config = if let Some(config_path) = cli_config {
            Self::load_from_file(config_path)?
        } else if let Ok(env_config) = std::env::var("LINKCTL_CONFIG") {
            Self::load_from_file(env_config)?
        } else if prefer_last_check && data_dir.join(LAST_CHECK_FILE).exists() {
            Self::load_from_file(data_dir.join(LAST_CHECK_FILE))?
        } else if data_dir.join(CONFIG_FILE).exists() {
            Self::load_from_file(data_dir.join(CONFIG_FILE))?
        } else {
            Self::default()
        };

        // CLI data_dir overrides whatever the file says
        if let Some(data_dir) = data_dir_override {
            config.data_dir = data_dir;
        }

        std::fs::create_dir_all(&config.data_dir).with_context(|| format!("Failed to create data dir {}", config.data_dir.display()))?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &ProbeArgs) {
        if let Some(namespace) = &args.namespace {
            self.cluster.namespace = namespace.clone();
        }
        if let Some(path) = &args.src_kubeconfig {
            self.cluster.src_kubeconfig = Some(path.clone());
        }
        if let Some(path) = &args.dst_kubeconfig {
            self.cluster.dst_kubeconfig = Some(path.clone());
        }
        if args.host_network {
            self.probe.host_network = true;
        }
        if let Some(protocol) = args.protocol {
            self.probe.protocol = protocol;
        }
        if let Some(port) = args.port {
            self.probe.port = port;
        }
        if let Some(max) = args.max_concurrency {
            self.probe.max_concurrency = max;
        }
        if let Some(timeout) = args.timeout_secs {
            self.probe.timeout_secs = timeout;
        }
        for (from, to) in &args.cidr_map {
            self.cluster.cidr_map.insert(from.clone(), to.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster.namespace.trim().is_empty() {
            bail!("namespace must be specified");
        }
        if self.cluster.agent_name.trim().is_empty() {
            bail!("agent_name must be specified");
        }
        if self.probe.timeout_secs == 0 {
            bail!("probe timeout must be at least one second");
        }
        self.rewrite_table()?;
        Ok(())
    }

    pub fn granularity(&self) -> Granularity {
        if self.probe.host_network { Granularity::Node } else { Granularity::Workload }
    }

    pub fn probe_kind(&self) -> ProbeKind {
        match self.probe.protocol {
            Protocol::Ping => ProbeKind::Ping,
            Protocol::Tcp => ProbeKind::Tcp { port: self.probe.port },
            Protocol::Udp => ProbeKind::Udp { port: self.probe.port },
        }
    }

    pub fn selector(&self) -> EndpointSelector {
        EndpointSelector::new(self.cluster.namespace.clone()).with_label("app", self.cluster.agent_name.clone())
    }

    pub fn rewrite_table(&self) -> Result<Option<AddressRewriteTable>> {
        if self.cluster.cidr_map.is_empty() {
            return Ok(None);
        }
        let table = AddressRewriteTable::from_cidr_pairs(&self.cluster.cidr_map).context("Invalid cidr_map")?;
        Ok(Some(table))
    }

    pub fn diagnosis_plan(&self, resume: ResumeSet) -> Result<DiagnosisPlan> {
        let mut plan = DiagnosisPlan::new(self.selector());
        plan.granularity = self.granularity();
        plan.probe_kind = self.probe_kind();
        plan.rewrite = self.rewrite_table()?;
        plan.resume = resume;
        plan.max_concurrency = self.probe.max_concurrency;
        plan.probe_timeout = Duration::from_secs(self.probe.timeout_secs);
        Ok(plan)
    }
}

/// Parses a `FROM=TO` CIDR pair given on the command line
pub fn parse_cidr_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => Ok((from.trim().to_string(), to.trim().to_string())),
        _ => Err(format!("expected FROM_CIDR=TO_CIDR, got {:?}", raw)),
    }
}
