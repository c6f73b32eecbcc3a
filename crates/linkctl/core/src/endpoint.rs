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

//! Probe endpoints and the granularity at which they are addressed

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Which address list of an endpoint takes part in a matrix pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Machine-level addresses (agents running on the host network)
    Node,
    /// Workload-level addresses (agents running on the overlay)
    #[default]
    Workload,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Node => write!(f, "node"),
            Granularity::Workload => write!(f, "workload"),
        }
    }
}

/// One addressable probe source or target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub node_name: String,
    pub node_addresses: Vec<IpAddr>,
    /// Name of the probe agent instance commands are executed against
    pub workload_name: String,
    pub workload_addresses: Vec<IpAddr>,
}

impl Endpoint {
    pub fn workload(node_name: impl Into<String>, workload_name: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        Self {
            node_name: node_name.into(),
            node_addresses: Vec::new(),
            workload_name: workload_name.into(),
            workload_addresses: addresses,
        }
    }

    pub fn node(node_name: impl Into<String>, workload_name: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        Self {
            node_name: node_name.into(),
            node_addresses: addresses,
            workload_name: workload_name.into(),
            workload_addresses: Vec::new(),
        }
    }

    /// Addresses probed for this endpoint at the given granularity
    pub fn addresses(&self, granularity: Granularity) -> &[IpAddr] {
        match granularity {
            Granularity::Node => &self.node_addresses,
            Granularity::Workload => &self.workload_addresses,
        }
    }

    /// Key used by the resume filter to identify this endpoint as a source
    pub fn source_key(&self) -> &str {
        &self.node_name
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node: {}, node addresses: {:?}, workload: {}, workload addresses: {:?}",
            self.node_name, self.node_addresses, self.workload_name, self.workload_addresses
        )
    }
}

/// Label selector used to find the probe agents of one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSelector {
    pub namespace: String,
    pub labels: Vec<(String, String)>,
}

impl EndpointSelector {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Renders the labels as `k1=v1,k2=v2`
    pub fn label_query(&self) -> String {
        self.labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
    }
}
