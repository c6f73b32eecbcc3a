use crate::config::{CONFIG_FILE, LinkctlConfig, default_data_dir};
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use tracing::info;

/// Writes the built-in defaults to `--config`, or to `<data_dir>/config.toml`
pub fn write_default_config(config_path: Option<PathBuf>, data_dir: Option<PathBuf>, force: bool) -> Result<()> {
    let data_dir = data_dir.or_else(|| std::env::var_os("LINKCTL_DATA_DIR").map(PathBuf::from)).unwrap_or_else(default_data_dir);
    let path = config_path.unwrap_or_else(|| data_dir.join(CONFIG_FILE));

    if path.exists() && !force {
        bail!("{} already exists, use --force to overwrite it", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let config = LinkctlConfig {
        data_dir,
        ..LinkctlConfig::default()
    };
    config.save_to_file(&path)?;

    info!("Wrote default configuration to {}", path.display());
    println!("Configuration written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("linkctl.toml");

        write_default_config(Some(path.clone()), Some(dir.path().to_path_buf()), false).unwrap();
        let written = LinkctlConfig::load_from_file(&path).unwrap();
        assert_eq!(written.data_dir, dir.path());
        assert_eq!(written.probe.max_concurrency, 3);

        assert!(write_default_config(Some(path.clone()), Some(dir.path().to_path_buf()), false).is_err());
        write_default_config(Some(path), Some(dir.path().to_path_buf()), true).unwrap();
    }

    #[test]
    fn test_init_defaults_to_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_default_config(None, Some(dir.path().to_path_buf()), false).unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());
    }
}
