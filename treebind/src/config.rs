//! Engine options

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::xml::DEFAULT_MARKER_ATTR;

/// Tunables for an [`Engine`](crate::Engine), loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Seconds between re-checks of a document's underlying source.
    /// Staleness up to this window is inherent; zero re-checks on every
    /// call.
    pub refresh_secs: u64,
    /// Attribute that flags an element as a dynamic binding point
    pub marker_attr: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            refresh_secs: 5,
            marker_attr: DEFAULT_MARKER_ATTR.to_string(),
        }
    }
}

impl EngineOptions {
    pub fn from_toml(input: &str) -> Result<Self> {
        toml::from_str(input).context("parsing engine options")
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}
