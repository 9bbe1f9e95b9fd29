//! TOML configuration for kelpd.
//!
//! Every section is optional; a missing file or an empty one yields the
//! defaults below.

use std::path::{Path, PathBuf};

use anyhow::Context;
use kelp_types::LogConfig;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Data directory and writer identity.
    pub node: NodeSection,
    /// Options logs are opened with.
    pub log: LogConfig,
    /// Logging configuration.
    pub telemetry: TelemetrySection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Directory holding the node store, head pointers and the writer key.
    pub data_dir: PathBuf,
    /// Identity id bound to the writer key.
    pub identity: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".kelp"))
            .unwrap_or_else(|| PathBuf::from(".kelp"));
        Self {
            data_dir,
            identity: "kelpd".to_string(),
        }
    }
}

/// `[telemetry]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// Log level filter (e.g. "info", "debug", "kelp_log=debug").
    pub level: String,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl CliConfig {
    /// Load from the given TOML file, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }
}
