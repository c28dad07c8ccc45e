//! Configuration Module
//!
//! Loads server and cache policy configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{EngineOptions, EvictionPolicy, InvalidationPolicy, DEFAULT_CAPACITY_BYTES};
use crate::error::{CacheError, Result};

/// Server configuration parameters.
///
/// Numeric values fall back to their defaults when missing or unparsable;
/// policy names must be valid.
#[derive(Debug, Clone)]
pub struct Config {
    /// Byte budget of the cache
    pub capacity_bytes: u64,
    /// Optional bound on the number of cached entries
    pub max_keys: Option<usize>,
    pub eviction_policy: EvictionPolicy,
    /// Seed for RANDOM eviction
    pub eviction_seed: Option<u64>,
    pub invalidation_policy: InvalidationPolicy,
    /// Default TTL in seconds, used under TTL invalidation
    pub default_ttl: u64,
    pub delete_on_expire: bool,
    /// Simulated latency of the demo backing store
    pub backing_latency_ms: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Snapshot file loaded at startup and written at shutdown
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY_BYTES` - Byte budget (default: 1048576)
    /// - `MAX_KEYS` - Entry bound, unset or <= 0 for none (default: unset)
    /// - `EVICTION_POLICY` - LRU, LFU, FIFO or RANDOM (default: LRU)
    /// - `EVICTION_SEED` - Seed for RANDOM eviction (default: unset)
    /// - `INVALIDATION_POLICY` - NONE or TTL (default: NONE)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `DELETE_ON_EXPIRE` - Remove entries once found expired (default: true)
    /// - `BACKING_LATENCY_MS` - Simulated store latency (default: 1000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `SNAPSHOT_PATH` - Snapshot file (default: unset)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |name: &str| lookup(name).and_then(|v| v.trim().parse::<i64>().ok());

        let eviction_policy = match lookup("EVICTION_POLICY") {
            Some(name) => name.parse()?,
            None => defaults.eviction_policy,
        };

        let default_ttl = parse("DEFAULT_TTL")
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(defaults.default_ttl);

        let invalidation_policy = match lookup("INVALIDATION_POLICY") {
            Some(name) => {
                InvalidationPolicy::from_name(&name, Some(Duration::from_secs(default_ttl)))?
            }
            None => defaults.invalidation_policy,
        };
        if matches!(invalidation_policy, InvalidationPolicy::Event { .. }) {
            return Err(CacheError::InvalidPolicyConfiguration(
                "EVENT invalidation needs a staleness predicate and cannot be set from the environment"
                    .to_string(),
            ));
        }

        Ok(Self {
            capacity_bytes: parse("CACHE_CAPACITY_BYTES")
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(defaults.capacity_bytes),
            max_keys: parse("MAX_KEYS").and_then(|v| usize::try_from(v).ok().filter(|&n| n > 0)),
            eviction_policy,
            eviction_seed: lookup("EVICTION_SEED").and_then(|v| v.trim().parse().ok()),
            invalidation_policy,
            default_ttl,
            delete_on_expire: lookup("DELETE_ON_EXPIRE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.delete_on_expire),
            backing_latency_ms: parse("BACKING_LATENCY_MS")
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(defaults.backing_latency_ms),
            server_port: parse("SERVER_PORT")
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or(defaults.server_port),
            cleanup_interval: parse("CLEANUP_INTERVAL")
                .and_then(|v| u64::try_from(v).ok())
                .filter(|&secs| secs > 0)
                .unwrap_or(defaults.cleanup_interval),
            snapshot_path: lookup("SNAPSHOT_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Engine construction options derived from this configuration.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            eviction: self.eviction_policy,
            invalidation: self.invalidation_policy.clone(),
            delete_on_expire: self.delete_on_expire,
            max_keys: self.max_keys,
            seed: self.eviction_seed,
        }
    }

    pub fn backing_latency(&self) -> Duration {
        Duration::from_millis(self.backing_latency_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            max_keys: None,
            eviction_policy: EvictionPolicy::Lru,
            eviction_seed: None,
            invalidation_policy: InvalidationPolicy::None,
            default_ttl: 300,
            delete_on_expire: true,
            backing_latency_ms: 1000,
            server_port: 3000,
            cleanup_interval: 1,
            snapshot_path: None,
        }
    }
}
