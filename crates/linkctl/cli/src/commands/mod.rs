pub mod check;
pub mod config;
pub mod init;

use crate::config::{LAST_CHECK_FILE, LinkctlConfig, RESUME_FILE};
use anyhow::Result;
use std::path::PathBuf;

pub struct CommandContext {
    pub config: LinkctlConfig,
}

impl CommandContext {
    pub fn new(config: LinkctlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn resume_path(&self) -> PathBuf {
        self.config.data_dir.join(RESUME_FILE)
    }

    pub fn last_check_path(&self) -> PathBuf {
        self.config.data_dir.join(LAST_CHECK_FILE)
    }
}
