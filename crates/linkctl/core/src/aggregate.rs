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

//! Result accumulation and the resumable-failure extractor

use parking_lot::Mutex;

use crate::classify::{ClassifiedResult, ProbeStatus};

/// Append-only collection shared by the matrix workers.
///
/// The lock is held for the push alone, so appends are linearizable and never
/// overlap a probe call.
#[derive(Debug, Default)]
pub struct ResultSink {
    results: Mutex<Vec<ClassifiedResult>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: ClassifiedResult) {
        self.results.lock().push(result);
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes everything appended so far, in append order
    pub fn drain(&self) -> Vec<ClassifiedResult> {
        std::mem::take(&mut *self.results.lock())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatrixSummary {
    pub succeeded: usize,
    pub probe_failed: usize,
    pub execution_errors: usize,
}

impl MatrixSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.probe_failed + self.execution_errors
    }

    pub fn resumable(&self) -> usize {
        self.probe_failed + self.execution_errors
    }
}

/// Outcome of one matrix pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixReport {
    results: Vec<ClassifiedResult>,
}

impl MatrixReport {
    pub fn new(results: Vec<ClassifiedResult>) -> Self {
        Self { results }
    }

    /// Every result in completion order
    pub fn results(&self) -> &[ClassifiedResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ClassifiedResult> {
        self.results
    }

    /// Non-success results, in completion order
    pub fn resumable(&self) -> Vec<ClassifiedResult> {
        self.results.iter().filter(|r| r.is_resumable()).cloned().collect()
    }

    pub fn with_status(&self, status: ProbeStatus) -> impl Iterator<Item = &ClassifiedResult> {
        self.results.iter().filter(move |r| r.status == status)
    }

    pub fn summary(&self) -> MatrixSummary {
        let mut summary = MatrixSummary::default();
        for result in &self.results {
            match result.status {
                ProbeStatus::Success => summary.succeeded += 1,
                ProbeStatus::ProbeFailed => summary.probe_failed += 1,
                ProbeStatus::ExecutionError => summary.execution_errors += 1,
            }
        }
        summary
    }
}

/// Splits results into `(all, resumable)`.
pub fn aggregate(results: Vec<ClassifiedResult>) -> (Vec<ClassifiedResult>, Vec<ClassifiedResult>) {
    let resumable = results.iter().filter(|r| r.is_resumable()).cloned().collect();
    (results, resumable)
}
