use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Maximum evaluation depth used when neither the process nor the model overrides it.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

static MAX_DEPTH: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_DEPTH);

/// The process-wide maximum evaluation depth.
pub fn default_max_depth() -> usize {
    MAX_DEPTH.load(Ordering::Relaxed)
}

/// Change the process-wide maximum evaluation depth. Models with their own
/// override are unaffected.
pub fn set_default_max_depth(depth: usize) {
    MAX_DEPTH.store(depth, Ordering::Relaxed);
}

/// Per-model settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Overrides [`default_max_depth`] for this model when set.
    pub max_depth: Option<usize>,
}

impl ModelConfig {
    pub fn max_depth(&self) -> usize {
        self.max_depth.unwrap_or_else(default_max_depth)
    }
}
