//! Machine sizing.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vm86_types::layout::{CODE_BASE, DATA_BASE, STACK_BASE};

#[cfg(not(feature = "small"))]
const DEFAULT_DATA_SIZE: usize = 2048;
#[cfg(not(feature = "small"))]
const DEFAULT_STACK_WORDS: usize = 2048;

#[cfg(feature = "small")]
const DEFAULT_DATA_SIZE: usize = 1024;
#[cfg(feature = "small")]
const DEFAULT_STACK_WORDS: usize = 1024;

/// A configuration whose regions would not fit the address map.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `DATA_BASE + data_size` runs into the code region.
    #[error("data segment of {data_size:#x} bytes overlaps the code region")]
    DataOverlapsCode { data_size: usize },

    /// `STACK_BASE + 4 * stack_words` does not fit in 32 bits.
    #[error("stack of {stack_words:#x} words runs past the end of the address space")]
    StackTooLarge { stack_words: usize },

    #[error("invalid machine config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sizes of the data segment and the stack.
///
/// Missing fields take their default when deserialized:
///
/// ```
/// use vm86_eval::MachineConfig;
///
/// let config = MachineConfig::from_json(r#"{ "stack_words": 64 }"#).unwrap();
/// assert_eq!(config.stack_words, 64);
/// assert_eq!(config.data_size, MachineConfig::default().data_size);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Capacity of the `.data` arena in bytes.
    pub data_size: usize,
    /// Number of 32-bit stack slots.
    pub stack_words: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            data_size: DEFAULT_DATA_SIZE,
            stack_words: DEFAULT_STACK_WORDS,
        }
    }
}

impl MachineConfig {
    /// Check that data, code and stack stay disjoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let data_end = u64::from(DATA_BASE).saturating_add(self.data_size as u64);
        if data_end > u64::from(CODE_BASE) {
            return Err(ConfigError::DataOverlapsCode {
                data_size: self.data_size,
            });
        }
        // ESP of an empty stack is its end address, so the end itself must
        // be a valid u32.
        let stack_end = (self.stack_words as u64)
            .checked_mul(4)
            .and_then(|bytes| bytes.checked_add(u64::from(STACK_BASE)));
        if stack_end.map_or(true, |end| end > u64::from(u32::MAX)) {
            return Err(ConfigError::StackTooLarge {
                stack_words: self.stack_words,
            });
        }
        Ok(())
    }

    /// Parse and validate.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> String {
        // A struct of two integers always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}
