//! Application configuration — persisted as JSON.

use std::path::{Path, PathBuf};

use llm_core::BackendOptions;
use serde::{Deserialize, Serialize};

/// Global configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// llama.cpp server executable (`llama-server` from `PATH` if unset).
    #[serde(default)]
    pub runner_path: Option<PathBuf>,
    /// Architecture hint used to read model headers.
    #[serde(default = "default_hint")]
    pub default_hint: String,
    #[serde(default = "default_ctx_size")]
    pub default_ctx_size: u32,
    /// Default GPU layers (-1 = all).
    #[serde(default = "default_gpu_layers")]
    pub default_n_gpu_layers: i32,
    #[serde(default)]
    pub default_threads: Option<u32>,
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,
}

fn default_hint() -> String {
    "llama".into()
}
fn default_ctx_size() -> u32 {
    2048
}
fn default_gpu_layers() -> i32 {
    -1
}
fn default_load_timeout() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            runner_path: None,
            default_hint: default_hint(),
            default_ctx_size: default_ctx_size(),
            default_n_gpu_layers: default_gpu_layers(),
            default_threads: None,
            load_timeout_secs: default_load_timeout(),
        }
    }
}

impl AppConfig {
    /// Platform config directory: `~/.config/ggml-loader/`
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ggml-loader")
    }

    fn config_file() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Load from disk, or return defaults if the file doesn't exist.
    pub fn load_or_default() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_file())
    }

    /// Persist to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_file())
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&data)?)
        } else {
            Ok(Self::default())
        }
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Update one key from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "runner_path" => self.runner_path = non_empty(value).map(PathBuf::from),
            "default_hint" => self.default_hint = value.to_string(),
            "default_ctx_size" => self.default_ctx_size = value.parse()?,
            "default_n_gpu_layers" => self.default_n_gpu_layers = value.parse()?,
            "default_threads" => {
                self.default_threads = non_empty(value).map(str::parse::<u32>).transpose()?
            }
            "load_timeout_secs" => self.load_timeout_secs = value.parse()?,
            _ => anyhow::bail!("Unknown config key: {key}"),
        }
        Ok(())
    }

    /// Backend options seeded from this configuration.
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            hint: self.default_hint.clone(),
            runner_path: self.runner_path.clone(),
            ctx_size: self.default_ctx_size,
            n_gpu_layers: self.default_n_gpu_layers,
            threads: self.default_threads,
            load_timeout_secs: self.load_timeout_secs,
            ..Default::default()
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}
