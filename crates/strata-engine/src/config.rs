use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Engine-wide defaults. Individual writes can override the write-related
/// fields through [`WriteOptions`](crate::WriteOptions).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Compare-and-set retries after the first attempt of a transaction.
    pub retries: u32,
    /// Branch opened by [`Store::main`](crate::Store::main).
    pub default_branch: String,
    /// Deepest history walk an LCA search may take before giving up.
    /// `None` is unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lca_max_depth: Option<usize>,
    /// Most lowest common ancestors a search may return. `None` is
    /// unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lca_max_count: Option<usize>,
    /// Whether a transaction that changes nothing still records a commit.
    pub allow_empty: bool,
    /// Author recorded when a commit's info has none.
    pub default_author: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retries: 13,
            default_branch: "main".into(),
            lca_max_depth: None,
            lca_max_count: None,
            allow_empty: false,
            default_author: "strata".into(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// LCA search bounds with unbounded limits resolved to `usize::MAX`.
    pub(crate) fn lca_bounds(&self) -> (usize, usize) {
        (
            self.lca_max_depth.unwrap_or(usize::MAX),
            self.lca_max_count.unwrap_or(usize::MAX),
        )
    }
}
