//! Configuration loading and XDG path helpers.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use melete_server::ServerConfig;
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE: &str = "config/settings";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub convert: ConvertApiConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Scratch directory for transient download staging; defaults to the
    /// XDG cache dir (or the system temp dir as a last resort).
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "GenerationConfig::default_api_base")]
    pub api_base: String,
    #[serde(default = "GenerationConfig::default_model")]
    pub model: String,
    #[serde(default = "GenerationConfig::default_ocr_model")]
    pub ocr_model: String,
    #[serde(default = "GenerationConfig::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "GenerationConfig::default_temperature")]
    pub temperature: f32,
    #[serde(default = "GenerationConfig::default_max_source_chars")]
    pub max_source_chars: usize,
}

impl GenerationConfig {
    fn default_api_base() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_ocr_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_max_tokens() -> u32 {
        4096
    }

    fn default_temperature() -> f32 {
        0.7
    }

    fn default_max_source_chars() -> usize {
        24_000
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: Self::default_api_base(),
            model: Self::default_model(),
            ocr_model: Self::default_ocr_model(),
            max_tokens: Self::default_max_tokens(),
            temperature: Self::default_temperature(),
            max_source_chars: Self::default_max_source_chars(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConvertApiConfig {
    /// Base URL of the remote PDF conversion service; PDF uploads fail with
    /// a signaled error when unset.
    #[serde(default)]
    pub pdf_api_base: Option<String>,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let builder = Config::builder()
        .set_default("server.listen_addr", "127.0.0.1:8080")?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix("MELETE").separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "melete", "melete").ok_or(AppConfigError::MissingProjectDirs)
}

pub fn default_scratch_dir() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.cache_dir().join("uploads"))
}
