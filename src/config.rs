//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. Every external credential is optional; a missing one disables
//! that dependency instead of failing startup.
//!
//! | Variable | Field |
//! |---|---|
//! | `FILECRITIC_CONFIG` | path of the TOML file |
//! | `FILECRITIC_HOST` / `FILECRITIC_PORT` | `server.host` / `server.port` |
//! | `FILECRITIC_TEMP_DIR` / `FILECRITIC_DATA_DIR` | `paths.temp_dir` / `paths.data_dir` |
//! | `FILECRITIC_STORE` | `instructions.backend` (`memory` or `sqlite`) |
//! | `FILECRITIC_MIRROR` | `instructions.mirror` |
//! | `GOOGLE_DRIVE_ACCESS_TOKEN` / `GOOGLE_DRIVE_FOLDER_ID` | `storage.*` |
//! | `GEMINI_API_KEY` / `GEMINI_MODEL` | `inference.*` |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_ENV: &str = "FILECRITIC_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
    pub instructions: InstructionStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Applied to every outbound provider call.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            max_upload_bytes: 50 * 1024 * 1024,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub temp_dir: String,
    pub data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("", "", "filecritic")
            .map(|dirs| dirs.data_dir().display().to_string())
            .unwrap_or_else(|| "./data".into());
        Self {
            temp_dir: std::env::temp_dir()
                .join("filecritic")
                .display()
                .to_string(),
            data_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub access_token: Option<String>,
    pub folder_id: Option<String>,
    pub api_base: String,
    /// Grant `anyone/reader` so links work without credentials.
    pub make_public: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            folder_id: None,
            api_base: "https://www.googleapis.com".into(),
            make_public: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".into(),
            api_base: "https://generativelanguage.googleapis.com".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionStoreConfig {
    pub backend: StoreBackend,
    /// Mirror records to `<data_dir>/instructions` as content + metadata files.
    pub mirror: bool,
}

impl Default for InstructionStoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            mirror: true,
        }
    }
}

impl Config {
    /// Load from `path`, `$FILECRITIC_CONFIG`, or the default config file, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_file);

        let mut config = match file {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                let parsed: Config = toml::from_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", p.display()))?;
                tracing::debug!(path = %p.display(), "Loaded config file");
                parsed
            }
            Some(p) if path.is_some() => {
                anyhow::bail!("Config file not found: {}", p.display());
            }
            _ => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("FILECRITIC_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("FILECRITIC_PORT") {
            self.server.port = v.parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
                key: "FILECRITIC_PORT".into(),
                value: v.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = get("FILECRITIC_TEMP_DIR") {
            self.paths.temp_dir = v;
        }
        if let Some(v) = get("FILECRITIC_DATA_DIR") {
            self.paths.data_dir = v;
        }
        if let Some(v) = get("FILECRITIC_STORE") {
            self.instructions.backend = match v.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "sqlite" => StoreBackend::Sqlite,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "FILECRITIC_STORE".into(),
                        value: v,
                        reason: "expected memory or sqlite".into(),
                    })
                }
            };
        }
        if let Some(v) = get("FILECRITIC_MIRROR") {
            self.instructions.mirror = match v.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "FILECRITIC_MIRROR".into(),
                        value: v,
                        reason: "expected a boolean".into(),
                    })
                }
            };
        }
        if let Some(v) = get("GOOGLE_DRIVE_ACCESS_TOKEN") {
            self.storage.access_token = Some(v);
        }
        if let Some(v) = get("GOOGLE_DRIVE_FOLDER_ID") {
            self.storage.folder_id = Some(v);
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.inference.api_key = Some(v);
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.inference.model = v;
        }

        // Blank credentials from the file count as absent.
        for cred in [
            &mut self.storage.access_token,
            &mut self.storage.folder_id,
            &mut self.inference.api_key,
        ] {
            if cred.as_deref().is_some_and(|c| c.trim().is_empty()) {
                *cred = None;
            }
        }
        Ok(())
    }

    pub fn temp_dir(&self) -> PathBuf {
        expand(&self.paths.temp_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        expand(&self.paths.data_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Copy with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***".to_string());
        let mut copy = self.clone();
        copy.storage.access_token = mask(&self.storage.access_token);
        copy.inference.api_key = mask(&self.inference.api_key);
        copy
    }
}

fn default_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "filecritic")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}
