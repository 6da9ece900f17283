//! Configuration for the subscriber core

use serde::{Deserialize, Serialize};

/// Configuration for the subscriber manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// How many GET/PATCH cycles to attempt when the store reports a
    /// version conflict before giving up on the operation
    pub max_patch_attempts: usize,

    /// Expiry sweep interval in seconds
    pub expiry_sweep_interval: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            max_patch_attempts: 3,
            expiry_sweep_interval: 30,
        }
    }
}
