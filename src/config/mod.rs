use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Config holds all application configuration, read from config.yaml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub inventory: InventoryConfig,
    pub runner: RunnerConfig,
    pub templates_dir: String,
    pub logging: LoggingConfig,
    /// Directory relative paths are resolved against (the config file's parent)
    #[serde(skip)]
    pub base_dir: PathBuf,
    /// Credentials applied to hosts the inventory leaves without one
    #[serde(skip)]
    pub default_username: Option<String>,
    #[serde(skip)]
    pub default_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub hosts_file: String,
    pub groups_file: String,
    pub defaults_file: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            hosts_file: "inventory/hosts.yaml".to_string(),
            groups_file: "inventory/groups.yaml".to_string(),
            defaults_file: "inventory/defaults.yaml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub num_workers: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { num_workers: 20 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "junos_push=debug"
    pub level: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut cfg = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        cfg.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        cfg.apply_env();
        Ok(cfg)
    }

    /// Parse configuration from YAML text. An empty document yields defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut cfg: Config = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        if cfg.templates_dir.is_empty() {
            cfg.templates_dir = ".".to_string();
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(workers) = get_env("JUNOS_PUSH_NUM_WORKERS").and_then(|v| v.parse().ok()) {
            self.runner.num_workers = workers;
        }
        if let Some(dir) = get_env("JUNOS_PUSH_TEMPLATES_DIR") {
            self.templates_dir = dir;
        }
        self.default_username = get_env("JUNOS_PUSH_USERNAME");
        self.default_password = get_env("JUNOS_PUSH_PASSWORD");
    }

    /// Resolve a configured path against the config file's directory
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    pub fn templates_path(&self) -> PathBuf {
        self.resolve(&self.templates_dir)
    }
}

fn get_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
