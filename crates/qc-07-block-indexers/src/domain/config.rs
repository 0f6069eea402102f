//! Filter index configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use qc_07_block_indexers::domain::FilterIndexConfigBuilder;
//!
//! let config = FilterIndexConfigBuilder::new()
//!     .p(20)
//!     .key([0x11; 16])
//!     .build()
//!     .expect("Valid config");
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::gcs_filter::{DEFAULT_P, KEY_SIZE, MAX_P};
use crate::error::IndexError;

/// Word repeated across the default filter key.
pub const DEFAULT_KEY_WORD: u32 = 0xcafe_babe;

/// Default SipHash key: `DEFAULT_KEY_WORD` big-endian, repeated.
pub const fn default_filter_key() -> [u8; KEY_SIZE] {
    let word = DEFAULT_KEY_WORD.to_be_bytes();
    let mut key = [0u8; KEY_SIZE];
    let mut i = 0;
    while i < KEY_SIZE {
        key[i] = word[i % 4];
        i += 1;
    }
    key
}

/// Parameters for building committed filters.
///
/// Changing either field invalidates every filter already stored; they must
/// be regenerated, not reinterpreted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterIndexConfig {
    /// False-positive parameter (collision probability ~2^-P)
    pub p: u8,
    /// SipHash key for domain separation
    pub key: [u8; KEY_SIZE],
}

impl Default for FilterIndexConfig {
    fn default() -> Self {
        Self {
            p: DEFAULT_P,
            key: default_filter_key(),
        }
    }
}

impl FilterIndexConfig {
    /// Create a new configuration with validation
    pub fn new(p: u8, key: [u8; KEY_SIZE]) -> Result<Self, IndexError> {
        let config = Self { p, key };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.p == 0 || self.p > MAX_P {
            return Err(IndexError::InvalidConfig(format!(
                "p must be between 1 and {}, got {}",
                MAX_P, self.p
            )));
        }
        Ok(())
    }

    /// Builder-style method to set P
    pub fn with_p(mut self, p: u8) -> Self {
        self.p = p;
        self
    }

    /// Builder-style method to set the key
    pub fn with_key(mut self, key: [u8; KEY_SIZE]) -> Self {
        self.key = key;
        self
    }
}

/// Builder for FilterIndexConfig with validation
#[derive(Default)]
pub struct FilterIndexConfigBuilder {
    p: Option<u8>,
    key: Option<[u8; KEY_SIZE]>,
}

impl FilterIndexConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn p(mut self, p: u8) -> Self {
        self.p = Some(p);
        self
    }

    pub fn key(mut self, key: [u8; KEY_SIZE]) -> Self {
        self.key = Some(key);
        self
    }

    /// Build and validate. Unset fields take their defaults.
    pub fn build(self) -> Result<FilterIndexConfig, IndexError> {
        let defaults = FilterIndexConfig::default();
        FilterIndexConfig::new(
            self.p.unwrap_or(defaults.p),
            self.key.unwrap_or(defaults.key),
        )
    }
}
