//! Store configuration
//!
//! Configuration is loaded from environment variables with defaults for
//! everything except the storage location.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default LMDB map size in megabytes.
pub const DEFAULT_MAP_SIZE_MB: usize = 64;

/// Map size in bytes, or `None` when it does not fit in a `usize`.
pub fn map_size_bytes(map_size_mb: usize) -> Option<usize> {
    map_size_mb.checked_mul(1024 * 1024)
}

// ============================================================================
// MALFORMED RECORD POLICY
// ============================================================================

/// What a retrieval does with a persisted image whose id or url no longer
/// parses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MalformedRecordPolicy {
    /// Fail the whole retrieval with a mapping error.
    #[default]
    Reject,
    /// Drop the offending image and return the rest in stored order.
    Skip,
}

impl MalformedRecordPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MalformedRecordPolicy::Reject => "reject",
            MalformedRecordPolicy::Skip => "skip",
        }
    }
}

impl fmt::Display for MalformedRecordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MalformedRecordPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(MalformedRecordPolicy::Reject),
            "skip" => Ok(MalformedRecordPolicy::Skip),
            _ => Err(ConfigError::InvalidValue {
                field: "FEEDSTORE_MALFORMED_POLICY".to_string(),
                value: s.to_string(),
                reason: "expected 'reject' or 'skip'".to_string(),
            }),
        }
    }
}

// ============================================================================
// STORE CONFIGURATION
// ============================================================================

/// Configuration for a file-backed feed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the storage engine files.
    pub path: PathBuf,
    /// Maximum size of the memory map in megabytes.
    pub map_size_mb: usize,
    /// Handling of persisted images that fail to map back.
    pub malformed_record_policy: MalformedRecordPolicy,
}

impl StoreConfig {
    /// Create a config for `path` with default values.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map_size_mb: DEFAULT_MAP_SIZE_MB,
            malformed_record_policy: MalformedRecordPolicy::default(),
        }
    }

    /// Set the map size.
    pub fn with_map_size_mb(mut self, map_size_mb: usize) -> Self {
        self.map_size_mb = map_size_mb;
        self
    }

    /// Set the malformed record policy.
    pub fn with_malformed_record_policy(mut self, policy: MalformedRecordPolicy) -> Self {
        self.malformed_record_policy = policy;
        self
    }

    /// Create StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `FEEDSTORE_PATH`: storage directory (required)
    /// - `FEEDSTORE_MAP_SIZE_MB`: map size in megabytes (default: 64)
    /// - `FEEDSTORE_MALFORMED_POLICY`: "reject" or "skip" (default: reject)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("FEEDSTORE_PATH")
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "FEEDSTORE_PATH".to_string(),
            })?;

        let map_size_mb = match lookup("FEEDSTORE_MAP_SIZE_MB") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "FEEDSTORE_MAP_SIZE_MB".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
            None => DEFAULT_MAP_SIZE_MB,
        };

        let malformed_record_policy = match lookup("FEEDSTORE_MALFORMED_POLICY") {
            Some(raw) => raw.parse()?,
            None => MalformedRecordPolicy::default(),
        };

        let config = Self {
            path: PathBuf::from(path),
            map_size_mb,
            malformed_record_policy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the storage engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if map_size_bytes(self.map_size_mb).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "overflows the addressable map size".to_string(),
            });
        }
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "path".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
