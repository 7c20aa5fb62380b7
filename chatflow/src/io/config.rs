//! Dispatch configuration stored as TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::codec::DEFAULT_PAYLOAD_LIMIT_BYTES;
use crate::definition::ParseMode;

/// Dispatcher configuration (TOML).
///
/// Missing fields default to the reference transport's values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Record a failing unit's error on the main output and keep going,
    /// instead of aborting the batch.
    pub continue_on_fail: bool,

    /// Maximum encoded routing token size in bytes.
    pub payload_limit_bytes: usize,

    /// Parse mode for steps that do not set one.
    pub default_parse_mode: ParseMode,

    /// Field of a unit's data that receives the visited path on forward.
    pub path_field: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            continue_on_fail: false,
            payload_limit_bytes: DEFAULT_PAYLOAD_LIMIT_BYTES,
            default_parse_mode: ParseMode::Html,
            path_field: "path".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.payload_limit_bytes == 0 {
            return Err(anyhow!("payload_limit_bytes must be > 0"));
        }
        if self.path_field.trim().is_empty() {
            return Err(anyhow!("path_field must be a non-empty string"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DispatchConfig::default()`.
pub fn load_config(path: &Path) -> Result<DispatchConfig> {
    if !path.exists() {
        let cfg = DispatchConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DispatchConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DispatchConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
