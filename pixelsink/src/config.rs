use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::UploadError;

pub const MAX_BYTES_ENV: &str = "PIXELSINK_MAX_BYTES";
pub const STRICT_DECLARED_LENGTH_ENV: &str = "PIXELSINK_STRICT_DECLARED_LENGTH";

/// Chunk size used when the caller does not pick one.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(64 * 1024) {
    Some(size) => size,
    None => panic!("chunk size must be positive"),
};

/// Limits applied to a single upload.
///
/// `max_bytes` has no default. An unset budget is reported as
/// [`UploadError::ConfigMissing`] when a file is announced.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    pub max_bytes: Option<u64>,
    /// Also reject uploads that send more than the length they announced.
    pub strict_declared_length: bool,
}

impl UploadLimits {
    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            ..Self::default()
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_declared_length = strict;
        self
    }

    /// The configured budget. Zero counts as unset.
    pub fn budget(&self) -> std::result::Result<u64, UploadError> {
        match self.max_bytes {
            Some(max) if max > 0 => Ok(max),
            _ => Err(UploadError::ConfigMissing),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read limits from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse limits in {}", path.display()))
    }

    /// Loads the default config file if there is one, otherwise returns unset limits.
    pub fn load_default() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write limits to {}", path.display()))
    }

    pub fn config_path() -> Option<PathBuf> {
        let home = std::env::home_dir()?;
        Some(home.join(".config").join("pixelsink").join("limits.json"))
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(MAX_BYTES_ENV) {
            let max = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{MAX_BYTES_ENV} must be a byte count, got `{value}`"))?;
            self.max_bytes = Some(max);
        }

        if let Some(value) = lookup(STRICT_DECLARED_LENGTH_ENV) {
            self.strict_declared_length = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => anyhow::bail!("{STRICT_DECLARED_LENGTH_ENV} must be a boolean, got `{value}`"),
            };
        }

        Ok(self)
    }
}
