//! Configuration for kubegraph
//!
//! Supports loading config from:
//! - An explicit `--config` file
//! - `kubegraph.toml` in the working directory
//! - ~/.config/kubegraph/config.toml
//! - Environment variables (highest priority)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-local config file name
pub const CONFIG_FILE: &str = "kubegraph.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory holding the graph database (default: .kubegraph/graph)
    pub path: Option<PathBuf>,
}

/// Limits and constants used by the builder and analyzers
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Candidate source vertices examined per path search
    pub source_sample: usize,
    /// Paths emitted per source vertex
    pub paths_per_source: usize,
    /// Largest accepted `max_depth`
    pub max_depth_limit: usize,
    /// `max_depth` used when the caller gives none
    pub default_max_depth: usize,
    /// Vertices included in a visualization projection
    pub viz_node_limit: usize,
    /// Incident edges fetched per visualized vertex
    pub viz_edges_per_node: usize,
    /// Read query timeout, 0 disables it
    pub query_timeout_secs: u64,
    /// Confidence attached to synthesized escalation edges
    pub escalation_confidence: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            source_sample: 10,
            paths_per_source: 20,
            max_depth_limit: 10,
            default_max_depth: 5,
            viz_node_limit: 200,
            viz_edges_per_node: 50,
            query_timeout_secs: 30,
            escalation_confidence: 0.7,
        }
    }
}

impl AnalysisConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }
}

impl Config {
    /// Load config from all sources, with priority:
    /// 1. Environment variables (highest)
    /// 2. Explicit file, or ./kubegraph.toml, or the user config
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::discover() {
                Some(path) => {
                    tracing::debug!("Loading config from {}", path.display());
                    Self::from_file(&path)?
                }
                None => Config::default(),
            },
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a single TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        Self::user_config_path().filter(|p| p.exists())
    }

    /// Get the user config directory path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kubegraph").join("config.toml"))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("KUBEGRAPH_DB_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }
        if let Ok(secs) = std::env::var("KUBEGRAPH_QUERY_TIMEOUT_SECS") {
            self.analysis.query_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| {
                    format!("KUBEGRAPH_QUERY_TIMEOUT_SECS='{}' is not a number", secs)
                })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if a.max_depth_limit == 0 {
            anyhow::bail!("analysis.max_depth_limit must be at least 1");
        }
        if a.default_max_depth == 0 || a.default_max_depth > a.max_depth_limit {
            anyhow::bail!(
                "analysis.default_max_depth must be between 1 and {}",
                a.max_depth_limit
            );
        }
        if !(0.0..=1.0).contains(&a.escalation_confidence) {
            anyhow::bail!("analysis.escalation_confidence must be within [0, 1]");
        }
        Ok(())
    }

    /// Graph database directory
    pub fn db_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".kubegraph").join("graph"))
    }

    /// Example config written by `kubegraph init`
    pub fn example() -> &'static str {
        r#"# kubegraph configuration

[store]
# Directory holding the graph database
# path = ".kubegraph/graph"

[analysis]
# Source vertices examined per path search
source_sample = 10
# Paths kept per source vertex
paths_per_source = 20
# Largest accepted --max-depth
max_depth_limit = 10
default_max_depth = 5
# Visualization bounds
viz_node_limit = 200
viz_edges_per_node = 50
# Read query timeout in seconds (0 = none)
query_timeout_secs = 30
# Confidence attached to service-account -> cluster-role escalation edges
escalation_confidence = 0.7
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses_to_defaults() {
        let parsed: Config = toml::from_str(Config::example()).expect("example config is valid");
        assert_eq!(parsed.analysis, AnalysisConfig::default());
        assert!(parsed.store.path.is_none());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let parsed: Config = toml::from_str("[analysis]\nsource_sample = 3\n").unwrap();
        assert_eq!(parsed.analysis.source_sample, 3);
        assert_eq!(parsed.analysis.paths_per_source, 20);
        assert_eq!(parsed.db_path(), PathBuf::from(".kubegraph").join("graph"));
    }

    #[test]
    fn test_invalid_limits_are_rejected() {
        let mut config = Config::default();
        config.analysis.default_max_depth = 50;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.escalation_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[store]\npath = \"/tmp/kg\"\n[analysis]\nviz_node_limit = 5\n")
            .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/kg"));
        assert_eq!(config.analysis.viz_node_limit, 5);
        assert_eq!(config.analysis.query_timeout(), Some(Duration::from_secs(30)));
    }
}
