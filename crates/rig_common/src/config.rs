//! Configuration for rig.
//!
//! Loads settings from ~/.config/rig/config.toml or uses defaults.
//! Every knob is optional; a missing or unreadable file falls back to the
//! compiled-in defaults with a warning.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Resolution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum number of tools a candidate stack must contain
    #[serde(default = "default_min_tools")]
    pub min_tools: usize,

    /// Category names that must be covered by a candidate stack
    #[serde(default = "default_required_categories")]
    pub required_categories: Vec<String>,

    /// Total distinct command attempts allowed per tool
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Install command timeout in seconds
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,

    /// Check command timeout in seconds
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_tools: default_min_tools(),
            required_categories: default_required_categories(),
            max_attempts: default_max_attempts(),
            install_timeout_secs: default_install_timeout(),
            check_timeout_secs: default_check_timeout(),
        }
    }
}

/// Knowledge store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Database directory. Defaults to ~/.local/share/rig
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Minimum similarity score for a match to count
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Maximum similarity results returned per query
    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,

    /// Statistics aggregation window in days
    #[serde(default = "default_stats_window_days")]
    pub stats_window_days: i64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            similarity_threshold: default_similarity_threshold(),
            similarity_top_k: default_similarity_top_k(),
            stats_window_days: default_stats_window_days(),
        }
    }
}

/// Complete rig configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

fn default_min_tools() -> usize {
    8
}

fn default_required_categories() -> Vec<String> {
    vec!["editor".to_string(), "version_control".to_string()]
}

fn default_max_attempts() -> u32 {
    3
}

fn default_install_timeout() -> u64 {
    90
}

fn default_check_timeout() -> u64 {
    15
}

fn default_similarity_threshold() -> f64 {
    0.5
}

fn default_similarity_top_k() -> usize {
    5
}

fn default_stats_window_days() -> i64 {
    30
}

impl RigConfig {
    /// Default config file location (~/.config/rig/config.toml)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("rig")
            .join("config.toml")
    }

    /// Load from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: RigConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults if the
    /// file is missing or malformed.
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default config: {:#}", e);
                Self::default()
            }
        }
    }

    /// Resolved knowledge data directory
    pub fn data_dir(&self) -> PathBuf {
        self.knowledge.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("rig")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RigConfig::default();
        assert_eq!(config.engine.min_tools, 8);
        assert_eq!(config.engine.max_attempts, 3);
        assert_eq!(config.knowledge.similarity_top_k, 5);
        assert!(config.knowledge.similarity_threshold > 0.0);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: RigConfig = toml::from_str(
            r#"
            [engine]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(parsed.engine.max_attempts, 5);
        assert_eq!(parsed.engine.min_tools, 8);
        assert_eq!(parsed.knowledge.stats_window_days, 30);
    }
}
