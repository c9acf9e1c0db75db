//! Application and engine configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Composition engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Optional filter catalog replacing the built-in table.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

/// Settings recognized by the composition engine at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Preferred rendering backend. Advisory: hardware is only used when
    /// a hardware backend is registered and constructs successfully.
    #[serde(default)]
    pub backend: BackendPreference,

    /// Scheduling hint for the render worker.
    #[serde(default)]
    pub worker_priority: WorkerPriority,

    /// Thread name for the render worker.
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
}

/// Which rendering backend to try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// GPU-backed rendering, falling back to software.
    #[default]
    Hardware,
    /// Skip hardware probing entirely.
    Software,
}

/// Scheduling hint for the render worker queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPriority {
    /// Interactive playback; frames are needed now.
    UserInteractive,
    #[default]
    Default,
    /// Offline export or thumbnail generation.
    Background,
}

impl WorkerPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInteractive => "user_interactive",
            Self::Default => "default",
            Self::Background => "background",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "framefx_render_engine=trace,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Include thread names (useful to tell the render worker apart).
    #[serde(default)]
    pub thread_names: bool,
}

fn default_worker_name() -> String {
    "framefx-render".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::default(),
            worker_priority: WorkerPriority::default(),
            worker_name: default_worker_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            thread_names: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framefx").join("config.json")
}
