use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use tracing::debug;

use crate::{engine::EngineConfig, logger::LoggerConfig};

pub(crate) mod defaults;
pub mod engine;
pub mod logger;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(skip_serializing)]
    path: Option<Utf8PathBuf>,

    /// Script engine configuration, applied once per process
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logger configuration for hosts embedding workers
    #[serde(default)]
    pub logger: LoggerConfig,
}

impl Config {
    #[must_use]
    pub fn with_path(mut self, path: &Utf8PathBuf) -> Self {
        self.path = Some(path.clone());
        self
    }

    pub fn path(&self) -> Utf8PathBuf {
        self.path.clone().unwrap_or(Self::default_path())
    }

    /// Loads config from a json file
    ///
    /// # Errors
    ///
    /// This function will return an error if the config path does not exist or the content is invalid
    pub fn load(path: &Utf8PathBuf) -> Result<Self> {
        debug!("Loading config from {path}");

        if !path.exists() {
            anyhow::bail!("Config file does not exist: {path}");
        }

        let contents =
            fs::read_to_string(path).context(format!("Failed reading config: {path} "))?;

        let mut cfg: Self =
            serde_json::from_str(&contents).context(format!("Failed loading config: {path} "))?;
        cfg.path = Some(path.clone());

        Ok(cfg)
    }

    /// Saves config to json file, falling back on default path if none is provided
    ///
    /// # Errors
    /// This function will error if it fails writing the config
    pub fn save(&self) -> Result<()> {
        let dest = self.path();
        debug!("Saving config to {dest}");
        let contents = serde_json::to_string_pretty(self).unwrap_or(json!(self).to_string());

        fs::write(&dest, contents).context(format!("Failed writing config: {dest}"))?;

        Ok(())
    }

    /// Default config path is ./v8worker.json
    pub fn default_path() -> Utf8PathBuf {
        Utf8PathBuf::new().join("v8worker.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LogLevel, LoggerFormat};

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("temp dir should be utf-8")
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "missing.json");

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "got: {err}");
    }

    #[test]
    fn test_load_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "v8worker.json");
        fs::write(&path, "{}").unwrap();

        let cfg = Config::load(&path).expect("empty object is a valid config");
        assert!(cfg.engine.flags.is_empty());
        assert!(cfg.logger.enabled);
        assert_eq!(cfg.logger.level, LogLevel::Info);
        assert_eq!(cfg.path(), path);
    }

    #[test]
    fn test_load_reads_engine_flags_and_logger() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "v8worker.json");
        fs::write(
            &path,
            r#"{
                "engine": { "flags": ["--max-old-space-size=64", "--stack-size=512"] },
                "logger": { "level": "DEBUG", "format": "json", "colors": false }
            }"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(
            cfg.engine.flags,
            vec!["--max-old-space-size=64", "--stack-size=512"]
        );
        assert_eq!(cfg.logger.level, LogLevel::Debug);
        assert!(matches!(cfg.logger.format, LoggerFormat::Json));
        assert!(!cfg.logger.colors);
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "v8worker.json");
        fs::write(&path, r#"{ "engine": { "flags": "not-a-list" } }"#).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed loading config"), "got: {err}");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "saved.json");

        let mut cfg = Config::default().with_path(&path);
        cfg.engine.flags.push("--expose-gc".into());
        cfg.save().unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.engine.flags, vec!["--expose-gc"]);
    }

    #[test]
    fn test_default_path() {
        assert_eq!(Config::default().path(), Utf8PathBuf::from("v8worker.json"));
    }
}
