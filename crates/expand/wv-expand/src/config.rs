//! Expansion settings

use serde::{Deserialize, Serialize};
use wv_tree::Name;

/// Default limit on nested rule applications
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Heads the engine emits when it has to generate code of its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpliceForms {
    /// Sequential block: `(__block__ stmt ... result)`
    pub block: Name,
    /// Local binding: `(= local value)`
    pub bind: Name,
}

impl Default for SpliceForms {
    fn default() -> Self {
        Self {
            block: Name::new("__block__"),
            bind: Name::new("="),
        }
    }
}

/// Expander configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandConfig {
    /// Maximum depth of nested rule applications
    pub max_depth: usize,
    /// Forms used by eager splicing and empty finalize output
    pub splice_forms: SpliceForms,
}

impl ExpandConfig {
    /// Sets the depth limit
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            splice_forms: SpliceForms::default(),
        }
    }
}
