use crate::{
    conflicts::{ConflictEngine, FileEngine, HttpEngine, UnavailableEngine},
    filters::{FilterSettings, DEFAULT_DO_NOT_CLEAN_PHRASE},
};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineConfig {
    #[default]
    None,
    File {
        path: PathBuf,
    },
    Http {
        url: String,
        #[serde(default = "default_engine_timeout")]
        timeout_secs: u64,
    },
}

impl EngineConfig {
    pub fn build(&self) -> Arc<dyn ConflictEngine> {
        match self {
            EngineConfig::None => Arc::new(UnavailableEngine),
            EngineConfig::File { path } => Arc::new(FileEngine::new(path.clone())),
            EngineConfig::Http { url, timeout_secs } => Arc::new(HttpEngine::new(
                url.clone(),
                Duration::from_secs(*timeout_secs),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub filters: FilterSettings,
    #[serde(default = "default_do_not_clean_phrase")]
    pub do_not_clean_phrase: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub last_snapshot: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            filters: FilterSettings::default(),
            do_not_clean_phrase: default_do_not_clean_phrase(),
            engine: EngineConfig::default(),
            log_level: default_log_level(),
            last_snapshot: None,
        }
    }
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_in(&base_data_dir()?)
    }

    pub fn load_or_create_in(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).context("create app data dir")?;
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            return Ok(config);
        }

        let config = AppConfig::default();
        config.save_in(dir)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_in(&base_data_dir()?)
    }

    pub fn save_in(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).context("create app data dir")?;
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(dir.join(CONFIG_FILE), raw).context("write app config")?;
        Ok(())
    }
}

fn default_do_not_clean_phrase() -> String {
    DEFAULT_DO_NOT_CLEAN_PHRASE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_engine_timeout() -> u64 {
    30
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("plugindeck"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_defaults_on_first_run() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = AppConfig::load_or_create_in(dir.path()).expect("config");
        assert_eq!(config, AppConfig::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn saved_settings_come_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = AppConfig::default();
        config.filters.hide_notes = true;
        config.filters.hide_crcs = true;
        config.engine = EngineConfig::Http {
            url: "http://127.0.0.1:9000/query".to_string(),
            timeout_secs: 5,
        };
        config.save_in(dir.path()).expect("save");

        let loaded = AppConfig::load_or_create_in(dir.path()).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn engine_defaults_to_none() {
        assert_eq!(EngineConfig::default(), EngineConfig::None);
        let config: AppConfig = serde_json::from_str("{}").expect("empty config");
        assert_eq!(config.engine, EngineConfig::None);
        assert_eq!(
            serde_json::to_value(&config.engine).expect("encode"),
            serde_json::json!({ "kind": "none" })
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"filters": {"hideInactivePlugins": true}, "engine": {"kind": "file", "path": "/tmp/c.json"}}"#,
        )
        .expect("write");
        let config = AppConfig::load_or_create_in(dir.path()).expect("load");
        assert!(config.filters.hide_inactive_plugins);
        assert_eq!(config.do_not_clean_phrase, "Do not clean");
        assert_eq!(config.log_level, "info");
        assert_eq!(
            config.engine,
            EngineConfig::File {
                path: PathBuf::from("/tmp/c.json")
            }
        );
    }
}
