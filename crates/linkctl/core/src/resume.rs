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

//! Resume support - the remembered failure set, the skip filter, and the
//! on-disk record file a resume run is loaded from

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::classify::ClassifiedResult;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed resume records in {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Pairs of `(source node, target address)` that failed in a previous run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeSet {
    targets_by_source: HashMap<String, HashSet<IpAddr>>,
}

impl ResumeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ClassifiedResult>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.insert(record.source_node.clone(), record.target_address);
        }
        set
    }

    pub fn insert(&mut self, source_key: impl Into<String>, target: IpAddr) -> bool {
        self.targets_by_source.entry(source_key.into()).or_default().insert(target)
    }

    pub fn contains(&self, source_key: &str, target: IpAddr) -> bool {
        self.targets_by_source.get(source_key).is_some_and(|targets| targets.contains(&target))
    }

    pub fn is_empty(&self) -> bool {
        self.targets_by_source.values().all(HashSet::is_empty)
    }

    pub fn len(&self) -> usize {
        self.targets_by_source.values().map(HashSet::len).sum()
    }
}

/// Decides whether a cell is left out of this run.
///
/// A fresh run (empty set) skips nothing. A resume run skips every pair that
/// did not fail last time.
pub fn should_skip(source_key: &str, target: IpAddr, resume: &ResumeSet) -> bool {
    if resume.is_empty() {
        return false;
    }
    !resume.contains(source_key, target)
}

/// Writes the resumable subset of a run as a JSON array
pub fn save_records(path: &Path, records: &[ClassifiedResult]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PersistError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let content = serde_json::to_string_pretty(records).map_err(|source| PersistError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Saved {} resume records to {}", records.len(), path.display());
    Ok(())
}

/// Reads resume records. A missing file yields `None`.
pub fn load_records(path: &Path) -> Result<Option<Vec<ClassifiedResult>>, PersistError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No resume records at {}", path.display());
            return Ok(None);
        }
        Err(source) => {
            return Err(PersistError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let records: Vec<ClassifiedResult> = serde_json::from_str(&content).map_err(|source| PersistError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(records))
}
