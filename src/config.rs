use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppSettings {
    #[serde(default = "default_true")]
    pub show_compatibility_ratings: bool,
    #[serde(default)]
    pub always_show_launch_affordance: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            show_compatibility_ratings: true,
            always_show_launch_affordance: false,
        }
    }
}

impl AppSettings {
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("settings record unparsable, using defaults: {err}");
                Self::default()
            }
        }
    }

    pub fn save(&self, data_dir: &Path) -> bool {
        let raw = match serde_json::to_string_pretty(self) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("failed to serialize settings: {err}");
                return false;
            }
        };
        if let Err(err) = fs::create_dir_all(data_dir) {
            warn!("failed to create data dir: {err}");
            return false;
        }
        match fs::write(data_dir.join(SETTINGS_FILE), raw) {
            Ok(()) => true,
            Err(err) => {
                warn!("failed to write settings: {err}");
                false
            }
        }
    }
}

fn default_true() -> bool {
    true
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("gameshelf"))
}

pub fn cover_cache_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve cache dir")?;
    Ok(base.cache_dir().join("gameshelf").join("covers"))
}
