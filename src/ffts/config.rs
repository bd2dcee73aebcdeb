//! Configuration for cache-context generation
//!
//! [`CacheTaskConfig`] carries the hardware limits the compiler must respect
//! and the contiguous-burst budget handed to the slice parameter generator.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config_error;
use crate::error::ForgeResult;

/// Maximum cache contexts per compute context fan-in/fan-out table
pub const MAX_PREFETCH_NUM: usize = 4;
/// Slot bits that fit the successor/slot encoding
pub const MAX_SLOT_NUM: usize = 26;
/// Successor list length of one context
pub const MAX_SUCCESSOR_NUM: usize = 26;

/// Configuration for cache-context generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTaskConfig {
    /// Fan-out cap per node and operation, also the source-slot limit
    pub max_prefetch_num: usize,

    /// Slots at or above this index are never considered
    pub max_slot_num: usize,

    /// Successor list limit of a single context
    pub max_successor_num: usize,

    /// Contiguous burst budget in bytes, 0 for unlimited
    pub burst_len: u64,
}

impl Default for CacheTaskConfig {
    fn default() -> Self {
        CacheTaskConfig {
            max_prefetch_num: MAX_PREFETCH_NUM,
            max_slot_num: MAX_SLOT_NUM,
            max_successor_num: MAX_SUCCESSOR_NUM,
            burst_len: 0,
        }
    }
}

impl CacheTaskConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fan-out cap
    pub fn with_max_prefetch_num(mut self, max_prefetch_num: usize) -> Self {
        self.max_prefetch_num = max_prefetch_num;
        self
    }

    /// Set the slot limit
    pub fn with_max_slot_num(mut self, max_slot_num: usize) -> Self {
        self.max_slot_num = max_slot_num;
        self
    }

    /// Set the successor limit
    pub fn with_max_successor_num(mut self, max_successor_num: usize) -> Self {
        self.max_successor_num = max_successor_num;
        self
    }

    /// Set the burst budget
    pub fn with_burst_len(mut self, burst_len: u64) -> Self {
        self.burst_len = burst_len;
        self
    }

    /// Reject limits the descriptor encoding cannot express
    pub fn validate(&self) -> ForgeResult<()> {
        if self.max_prefetch_num == 0 {
            return Err(config_error!("max_prefetch_num must be > 0"));
        }
        if self.max_prefetch_num > 32 {
            return Err(config_error!(
                "max_prefetch_num {} does not fit a 32-bit prefetch bitmap",
                self.max_prefetch_num
            ));
        }
        if self.max_slot_num == 0 || self.max_slot_num > 64 {
            return Err(config_error!(
                "max_slot_num must be in 1..=64, got {}",
                self.max_slot_num
            ));
        }
        if self.max_successor_num == 0 {
            return Err(config_error!("max_successor_num must be > 0"));
        }
        Ok(())
    }

    /// Load and validate a config from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> ForgeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: CacheTaskConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
}
