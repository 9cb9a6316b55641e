use crate::installer::ContainerPolicy;
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

pub const APP_DIR_NAME: &str = "northmod";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub game_path: Option<PathBuf>,
    #[serde(default)]
    pub install_all_from_containers: bool,
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            return Ok(config);
        }

        let config = AppConfig::default();
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }

    pub fn container_policy(&self) -> ContainerPolicy {
        if self.install_all_from_containers {
            ContainerPolicy::InstallAll
        } else {
            ContainerPolicy::FirstSuccess
        }
    }
}

/// Ephemeral extraction workspace, wiped at the start of every archive install.
pub fn staging_dir() -> Result<PathBuf> {
    Ok(base_data_dir()?.join("Archives"))
}

pub fn download_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve cache dir")?;
    let dir = base.cache_dir().join(APP_DIR_NAME).join("downloads");
    fs::create_dir_all(&dir).context("create download cache dir")?;
    Ok(dir)
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join(APP_DIR_NAME))
}
