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

//! Endpoint discovery seam

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::endpoint::{Endpoint, EndpointSelector, Granularity};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No endpoints in namespace {namespace} matching {selector:?}")]
    NoEndpoints { namespace: String, selector: String },
    #[error("Discovery backend unavailable: {0}")]
    Backend(String),
    #[error("Malformed discovery response: {0}")]
    Malformed(String),
}

/// Lists the probe agents of one cluster
#[async_trait]
pub trait EndpointDiscovery: Send + Sync {
    async fn list_endpoints(&self, selector: &EndpointSelector, granularity: Granularity) -> Result<Vec<Endpoint>, DiscoveryError>;
}

/// Lists endpoints and treats an empty answer as a failure.
pub async fn discover<D>(discovery: &D, selector: &EndpointSelector, granularity: Granularity) -> Result<Vec<Endpoint>, DiscoveryError>
where
    D: EndpointDiscovery + ?Sized,
{
    let endpoints = discovery.list_endpoints(selector, granularity).await?;
    if endpoints.is_empty() {
        return Err(DiscoveryError::NoEndpoints {
            namespace: selector.namespace.clone(),
            selector: selector.label_query(),
        });
    }

    info!("Discovered {} endpoints in {} ({} granularity)", endpoints.len(), selector.namespace, granularity);
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticDiscovery(Vec<Endpoint>);

    #[async_trait]
    impl EndpointDiscovery for StaticDiscovery {
        async fn list_endpoints(&self, _selector: &EndpointSelector, _granularity: Granularity) -> Result<Vec<Endpoint>, DiscoveryError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_empty_discovery_is_an_error() {
        let selector = EndpointSelector::new("kosmos-system").with_label("app", "clusterlink-floater");
        let err = discover(&StaticDiscovery(Vec::new()), &selector, Granularity::Workload).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoEndpoints { ref selector, .. } if selector == "app=clusterlink-floater"));
    }

    #[tokio::test]
    async fn test_discovery_passes_endpoints_through() {
        let endpoint = Endpoint::workload("node-1", "agent-1", vec!["10.244.1.2".parse().unwrap()]);
        let found = discover(&StaticDiscovery(vec![endpoint.clone()]), &EndpointSelector::new("ns"), Granularity::Workload)
            .await
            .unwrap();
        assert_eq!(found, vec![endpoint]);
    }
}
