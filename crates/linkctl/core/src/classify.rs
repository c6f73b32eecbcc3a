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

//! Result classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::probe::{ProbeError, ProbeReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Success,
    /// The probe ran and reported the target unreachable
    ProbeFailed,
    /// The probe could not be run at all
    ExecutionError,
}

impl ProbeStatus {
    /// Whether a result with this status belongs in the next resume set
    pub fn is_resumable(self) -> bool {
        !matches!(self, ProbeStatus::Success)
    }

    pub fn label(self) -> &'static str {
        match self {
            ProbeStatus::Success => "SUCCEEDED",
            ProbeStatus::ProbeFailed => "FAILED",
            ProbeStatus::ExecutionError => "EXCEPTION",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub detail: String,
}

impl ProbeOutcome {
    pub fn execution_error(detail: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::ExecutionError,
            detail: detail.into(),
        }
    }
}

/// One completed matrix cell. This is also the record persisted for resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedResult {
    pub source_node: String,
    pub dest_node: String,
    pub target_address: IpAddr,
    pub status: ProbeStatus,
    pub detail: String,
}

impl ClassifiedResult {
    pub fn new(source_node: impl Into<String>, dest_node: impl Into<String>, target_address: IpAddr, outcome: ProbeOutcome) -> Self {
        Self {
            source_node: source_node.into(),
            dest_node: dest_node.into(),
            target_address,
            status: outcome.status,
            detail: outcome.detail,
        }
    }

    pub fn is_resumable(&self) -> bool {
        self.status.is_resumable()
    }
}

/// Maps a raw probe attempt onto the three-way status taxonomy.
pub fn classify(raw: Result<ProbeReport, ProbeError>) -> ProbeOutcome {
    match raw {
        Ok(report) if report.reachable => ProbeOutcome {
            status: ProbeStatus::Success,
            detail: report.output.trim().to_string(),
        },
        Ok(report) => ProbeOutcome {
            status: ProbeStatus::ProbeFailed,
            detail: report.output.trim().to_string(),
        },
        Err(err) => ProbeOutcome::execution_error(err.to_string()),
    }
}
