//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::pattern::MatchOptions;
use crate::RuleError;

/// Configuration for a [`ModifierEngine`](crate::engine::ModifierEngine).
///
/// Missing fields take their defaults when deserialized, so `{}` is a valid
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Compare pattern literals to node names case-sensitively.
    pub case_sensitive: bool,
    /// Mount pending additions and replacements into the tree during a pass.
    /// When off they are returned in the [`PassReport`](crate::engine::PassReport).
    pub auto_mount: bool,
    /// Record every mutation in the engine's journal.
    pub journal: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            auto_mount: true,
            journal: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(s: &str) -> Result<Self, RuleError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Matching options derived from this configuration.
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: self.case_sensitive,
        }
    }
}
