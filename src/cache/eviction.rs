//! Eviction Module
//!
//! Victim selection strategies. Each call scans the current entry set once
//! and names a single key to remove.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::error::CacheError;

// == Eviction Policy ==
/// Named eviction policy, chosen at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionPolicy {
    /// Least recently used
    Lru,
    /// Least frequently used
    Lfu,
    /// First in, first out
    Fifo,
    /// Uniformly random
    Random,
}

impl FromStr for EvictionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LRU" => Ok(Self::Lru),
            "LFU" => Ok(Self::Lfu),
            "FIFO" => Ok(Self::Fifo),
            "RANDOM" => Ok(Self::Random),
            other => Err(CacheError::InvalidPolicyConfiguration(format!(
                "unknown eviction policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lru => "LRU",
            Self::Lfu => "LFU",
            Self::Fifo => "FIFO",
            Self::Random => "RANDOM",
        };
        f.write_str(name)
    }
}

// == Eviction Selector ==
/// Strategy object that picks one victim per call.
///
/// Ties are broken by insertion order: the map iterates oldest-first and the
/// first minimum wins.
#[derive(Debug)]
pub enum EvictionSelector {
    Lru,
    Lfu,
    Fifo,
    Random(StdRng),
}

impl EvictionSelector {
    // == Constructor ==
    /// Builds the selector for `policy`.
    ///
    /// `seed` only matters for `Random`; without one the generator is seeded
    /// from OS entropy.
    pub fn new(policy: EvictionPolicy, seed: Option<u64>) -> Self {
        match policy {
            EvictionPolicy::Lru => Self::Lru,
            EvictionPolicy::Lfu => Self::Lfu,
            EvictionPolicy::Fifo => Self::Fifo,
            EvictionPolicy::Random => Self::Random(match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            }),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        match self {
            Self::Lru => EvictionPolicy::Lru,
            Self::Lfu => EvictionPolicy::Lfu,
            Self::Fifo => EvictionPolicy::Fifo,
            Self::Random(_) => EvictionPolicy::Random,
        }
    }

    // == Select Victim ==
    /// Names the entry to evict, never returning `exclude`.
    ///
    /// Returns None only when no candidate exists; the engine never asks
    /// in that situation.
    pub fn select_victim<V>(
        &mut self,
        entries: &IndexMap<String, CacheEntry<V>>,
        exclude: Option<&str>,
    ) -> Option<String> {
        let mut candidates = entries
            .values()
            .filter(|entry| Some(entry.key.as_str()) != exclude);

        let victim = match self {
            Self::Lru => candidates.min_by_key(|entry| entry.last_accessed_at),
            Self::Lfu => candidates.min_by_key(|entry| entry.access_count),
            Self::Fifo => candidates.min_by_key(|entry| entry.inserted_at),
            Self::Random(rng) => {
                let excluded = exclude.is_some_and(|key| entries.contains_key(key));
                let count = entries.len() - usize::from(excluded);
                if count == 0 {
                    None
                } else {
                    candidates.nth(rng.gen_range(0..count))
                }
            }
        };

        victim.map(|entry| entry.key.clone())
    }
}
