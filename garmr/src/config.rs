//! Configuration readable from a config file.
//!
//! The KDC front end is configured through a [TOML](https://toml.io/en/)
//! file deserialized into [KdcConfig]. Every field has a default, so a
//! sparse file yields a runnable configuration; the config remembers the
//! path it was loaded from and can be written back with
//! [KdcConfig::commit].

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Number of hash buckets in the replay cache.
pub const DEFAULT_HASH_BUCKETS: usize = 16384;

/// Byte budget for the replay cache, entry headers included.
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Age (in either clock direction) past which a cached entry is stale.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 2 * 60;

fn default_hash_buckets() -> usize {
    DEFAULT_HASH_BUCKETS
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

fn default_stale_after_secs() -> i64 {
    DEFAULT_STALE_AFTER_SECS
}

/// Tuning knobs for the replay lookaside cache.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LookasideConfig {
    /// Number of buckets in the hash table. More buckets mean shorter
    /// chains; the table itself is a fixed allocation at startup.
    #[serde(default = "default_hash_buckets")]
    pub hash_buckets: usize,

    /// Total size budget in bytes. The cache evicts oldest-first to get
    /// back under this before every insert.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Entries older than this (in seconds, in either direction of the
    /// current clock) are discarded during eviction sweeps.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,
}

impl Default for LookasideConfig {
    fn default() -> Self {
        Self {
            hash_buckets: DEFAULT_HASH_BUCKETS,
            max_bytes: DEFAULT_MAX_BYTES,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
        }
    }
}

/// KDC front-end configuration.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct KdcConfig {
    /// Accept legacy version-4 requests. Off by default.
    #[serde(default)]
    pub allow_v4: bool,

    /// Replay cache tuning.
    #[serde(default)]
    pub lookaside: LookasideConfig,

    /// Path of the config file this config was loaded from, if any.
    #[serde(skip)]
    pub config_file_path: PathBuf,
}

impl KdcConfig {
    /// Load a config file from a file path
    pub fn load<P: AsRef<Path>>(p: P) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(&fs::read_to_string(&p)?)?;
        config.config_file_path = p.as_ref().to_owned();
        Ok(config)
    }

    /// Load a config from a string
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Write the config to a file
    pub fn store<P: AsRef<Path>>(&self, p: P) -> anyhow::Result<()> {
        let serialized_config = toml::to_string_pretty(&self)?;
        fs::write(p, serialized_config)?;
        Ok(())
    }

    /// Write the config back to the file it was loaded from
    pub fn commit(&self) -> anyhow::Result<()> {
        ensure!(
            !self.config_file_path.as_os_str().is_empty(),
            "config doesn't have a place to commit to"
        );
        self.store(&self.config_file_path)
    }

    /// Check that the configured values are usable
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.lookaside.hash_buckets > 0,
            "lookaside.hash_buckets must be at least 1"
        );
        ensure!(
            self.lookaside.max_bytes > 0,
            "lookaside.max_bytes must be at least 1"
        );
        ensure!(
            self.lookaside.stale_after_secs > 0,
            "lookaside.stale_after_secs must be at least 1"
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_documented_constants() {
        let config = KdcConfig::default();
        assert!(!config.allow_v4);
        assert_eq!(config.lookaside.hash_buckets, 16384);
        assert_eq!(config.lookaside.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.lookaside.stale_after_secs, 120);
        config.validate().unwrap();
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() -> anyhow::Result<()> {
        let config = KdcConfig::from_str("allow_v4 = true\n")?;
        assert!(config.allow_v4);
        assert_eq!(config.lookaside, LookasideConfig::default());

        let config = KdcConfig::from_str("[lookaside]\nmax_bytes = 4096\n")?;
        assert!(!config.allow_v4);
        assert_eq!(config.lookaside.max_bytes, 4096);
        assert_eq!(config.lookaside.hash_buckets, DEFAULT_HASH_BUCKETS);
        Ok(())
    }

    #[test]
    fn validate_rejects_zero_sizes() -> anyhow::Result<()> {
        let mut config = KdcConfig::default();
        config.lookaside.hash_buckets = 0;
        assert!(config.validate().is_err());

        let mut config = KdcConfig::default();
        config.lookaside.max_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = KdcConfig::default();
        config.lookaside.stale_after_secs = 0;
        assert!(config.validate().is_err());
        Ok(())
    }
}
