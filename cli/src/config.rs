//! Config file: an `engine` section and a `log` section, YAML or JSON.
//!
//! ```yaml
//! engine:
//!   id: allo-live
//!   checkpoint_interval: 50
//!   retry:
//!     max_retries: 3
//! log:
//!   level: info
//!   components:
//!     chainproject-core: debug
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use chainproject_core::EngineConfig;

use crate::logging::LogConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Missing section means the engine defaults.
    pub engine: Option<EngineConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse config file '{}'", path.display()))
    }

    /// YAML is a superset of JSON, so one parser serves both.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}
