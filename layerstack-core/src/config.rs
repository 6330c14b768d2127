//! Generator configuration, loaded from JSON with serde defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::host::SpacerAssets;
use crate::naming::{NamingConfig, Platform, SuffixMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    #[serde(default = "default_true")]
    pub use_suffixes_in_filenames: bool,
    #[serde(default)]
    pub platform: Platform,
    /// Run the preview pass before the final pass.
    #[serde(default)]
    pub needs_preview: bool,
    #[serde(default)]
    pub spacer_srgb: Option<PathBuf>,
    #[serde(default)]
    pub spacer_p3: Option<PathBuf>,
}

fn default_true() -> bool { true }

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            use_suffixes_in_filenames: true,
            platform: Platform::current(),
            needs_preview: false,
            spacer_srgb: None,
            spacer_p3: None,
        }
    }
}

impl GeneratorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn naming(&self) -> NamingConfig {
        NamingConfig {
            platform: self.platform,
            suffix_mode: SuffixMode::from(self.use_suffixes_in_filenames),
        }
    }

    pub fn spacer_assets(&self) -> Result<SpacerAssets, ConfigError> {
        let mut assets = SpacerAssets::builtin();
        if let Some(path) = &self.spacer_srgb {
            assets.srgb = read_asset(path)?;
        }
        if let Some(path) = &self.spacer_p3 {
            assets.p3 = read_asset(path)?;
        }
        Ok(assets)
    }
}

fn read_asset(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
}
