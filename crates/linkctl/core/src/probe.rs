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

//! Probe capability - the opaque "run this check on that endpoint" seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::endpoint::Endpoint;

/// Kind of reachability check to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ProbeKind {
    #[default]
    Ping,
    Tcp { port: u16 },
    Udp { port: u16 },
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Ping => write!(f, "ping"),
            ProbeKind::Tcp { port } => write!(f, "tcp/{}", port),
            ProbeKind::Udp { port } => write!(f, "udp/{}", port),
        }
    }
}

/// What a probe that ran to completion reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub reachable: bool,
    pub output: String,
}

impl ProbeReport {
    pub fn reachable(output: impl Into<String>) -> Self {
        Self {
            reachable: true,
            output: output.into(),
        }
    }

    pub fn unreachable(output: impl Into<String>) -> Self {
        Self {
            reachable: false,
            output: output.into(),
        }
    }
}

/// The attempt to run a probe failed before it could report anything
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to start probe: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Probe agent error: {0}")]
    Agent(String),
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Executes a single probe from `endpoint` against `target`.
///
/// Implementations must be safe to call concurrently for distinct endpoints.
/// `timeout` is advisory for the implementation; the scheduler enforces it
/// independently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn run_probe(&self, endpoint: &Endpoint, target: IpAddr, kind: ProbeKind, timeout: Duration) -> Result<ProbeReport, ProbeError>;
}
