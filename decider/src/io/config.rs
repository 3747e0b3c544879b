//! Engine configuration stored beside the definition files (TOML).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Decider configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeciderConfig {
    /// Definition files loaded into one namespace, in order.
    pub definitions: Vec<PathBuf>,

    /// Declared root to start execution from. Defaults to the definition's
    /// default root when unset.
    pub start_element: Option<String>,

    pub mirror: MirrorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MirrorConfig {
    /// Publish a stack snapshot every tick.
    pub enabled: bool,

    /// JSONL sink the snapshots are appended to (one per line).
    pub stream_path: PathBuf,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stream_path: PathBuf::from(".decider/stream.jsonl"),
        }
    }
}

impl Default for DeciderConfig {
    fn default() -> Self {
        Self {
            definitions: vec![PathBuf::from("behavior.tree")],
            start_element: None,
            mirror: MirrorConfig::default(),
        }
    }
}

impl DeciderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.definitions.is_empty() {
            return Err(anyhow!("definitions must list at least one file"));
        }
        if self.mirror.enabled && self.mirror.stream_path.as_os_str().is_empty() {
            return Err(anyhow!("mirror.stream_path must be set when mirror.enabled"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DeciderConfig::default()`.
pub fn load_config(path: &Path) -> Result<DeciderConfig> {
    if !path.exists() {
        let cfg = DeciderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DeciderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DeciderConfig) -> Result<()> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, DeciderConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = DeciderConfig {
            definitions: vec![PathBuf::from("a.tree"), PathBuf::from("b.tree")],
            start_element: Some("Fallback".to_string()),
            mirror: MirrorConfig {
                enabled: true,
                stream_path: PathBuf::from("stream.jsonl"),
            },
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn empty_definitions_are_rejected() {
        let cfg = DeciderConfig {
            definitions: Vec::new(),
            ..DeciderConfig::default()
        };
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("at least one file"));
    }
}
