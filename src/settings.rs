use crate::error::{Error, Result};
use crate::models::{ModelCatalog, ModelDescriptor, DEFAULT_MODEL};
use crate::scoring::{DeviceSpec, DEFAULT_BATCH_SIZE};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_ENV: &str = "CLASSRANKER_CONFIG";
pub const CACHE_DIR_ENV: &str = "CLASSRANKER_CACHE_DIR";
pub const DEVICE_ENV: &str = "CLASSRANKER_DEVICE";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub cache_dir: Option<PathBuf>,
    pub default_model: String,
    pub device: String,
    pub batch_size: usize,
    pub models: Vec<ModelDescriptor>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: None, // None means the per-user cache directory
            default_model: DEFAULT_MODEL.to_string(),
            device: "cpu".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            models: Vec::new(),
        }
    }
}

impl Settings {
    /// Loads `settings.json` from the config directory (or `$CLASSRANKER_CONFIG`)
    /// and applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => project_dirs()?.config_dir().join("settings.json"),
        };
        Ok(Self::load_from(&path)?.with_overrides(|key| std::env::var(key).ok()))
    }

    /// A missing file yields defaults; a malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| Error::storage(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(device) = lookup(DEVICE_ENV).filter(|v| !v.is_empty()) {
            self.device = device;
        }
        self
    }

    pub fn cache_root(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?
                .cache_dir()
                .join("checkpoints")
                .join("relion_class_ranker")),
        }
    }

    pub fn catalog(&self) -> ModelCatalog {
        ModelCatalog::builtin().with_models(self.models.iter().cloned())
    }

    pub fn device(&self) -> Result<DeviceSpec> {
        self.device.parse()
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "relion", "classranker")
        .ok_or_else(|| Error::Config("Failed to get project directories".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.default_model, "v1.0");
        assert_eq!(settings.device().unwrap(), DeviceSpec::Cpu);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "batch_size": 32,
                "models": [{"name": "v2.0", "source_url": "https://example.org/v2.ckpt.gz", "expected_hash": "aa"}]
            }"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.batch_size, 32);
        assert_eq!(settings.default_model, "v1.0");

        let catalog = settings.catalog();
        assert!(catalog.contains("v1.0"));
        assert_eq!(catalog.get("v2.0").unwrap().expected_hash, "aa");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> =
            HashMap::from([(CACHE_DIR_ENV, "/tmp/ranker-cache"), (DEVICE_ENV, "cuda:1")]);
        let settings = Settings::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.cache_root().unwrap(), PathBuf::from("/tmp/ranker-cache"));
        assert_eq!(settings.device().unwrap(), DeviceSpec::Cuda(1));
    }

    #[test]
    fn empty_override_is_ignored() {
        let settings = Settings::default().with_overrides(|_| Some(String::new()));
        assert_eq!(settings.device, "cpu");
        assert!(settings.cache_dir.is_none());
    }
}
