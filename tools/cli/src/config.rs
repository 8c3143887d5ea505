//! On-disk configuration for the drivemerge CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use drivemerge_drive::gdrive::DRIVE_API_BASE;
use drivemerge_drive::AuthConfig;
use drivemerge_pipeline::PipelineConfig;

const CONFIG_FILE: &str = "config.json";

/// Everything the CLI can be configured with.
///
/// Missing fields fall back to their defaults, so a file only needs to name
/// what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// OAuth2 client identity and scope.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Root of the Drive REST API.
    #[serde(default = "default_api_base")]
    pub drive_api_base: String,
    /// Directory merged documents are saved to (default: current directory).
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_api_base() -> String {
    DRIVE_API_BASE.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            drive_api_base: default_api_base(),
            output_dir: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Default location: `<config dir>/drivemerge/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("drivemerge").join(CONFIG_FILE))
    }

    /// Load from `path`, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.auth.client_secret.is_some() {
            copy.auth.client_secret = Some("[REDACTED]".to_string());
        }
        copy
    }
}
