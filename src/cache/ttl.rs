//! TTL Invalidation Module
//!
//! Decides whether an entry is stale. Stateless apart from the configured
//! policy.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

/// Caller-supplied staleness signal for event-driven invalidation.
pub type StalePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

// == Invalidation Policy ==
/// How entries become stale.
#[derive(Clone, Default)]
pub enum InvalidationPolicy {
    /// Nothing ever expires; TTLs passed to `put` are ignored
    #[default]
    None,
    /// Absolute expiry stamped on admission
    Ttl {
        /// Applied when `put` is called without an explicit TTL
        default_ttl: Option<Duration>,
    },
    /// Entries are stale whenever the predicate says so
    Event { predicate: Option<StalePredicate> },
}

impl InvalidationPolicy {
    /// Parses a policy name (`NONE`, `TTL`, `EVENT`).
    ///
    /// `EVENT` parses without a predicate and is rejected when the engine is
    /// built.
    pub fn from_name(name: &str, default_ttl: Option<Duration>) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "TTL" => Ok(Self::Ttl { default_ttl }),
            "EVENT" => Ok(Self::Event { predicate: None }),
            other => Err(CacheError::InvalidPolicyConfiguration(format!(
                "unknown invalidation policy '{}'",
                other
            ))),
        }
    }

    /// Event-driven invalidation with the given predicate.
    pub fn event<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Event {
            predicate: Some(Arc::new(predicate)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Ttl { .. } => "TTL",
            Self::Event { .. } => "EVENT",
        }
    }
}

impl fmt::Debug for InvalidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Ttl { default_ttl } => f
                .debug_struct("Ttl")
                .field("default_ttl", default_ttl)
                .finish(),
            Self::Event { predicate } => f
                .debug_struct("Event")
                .field("predicate", &predicate.as_ref().map(|_| "<fn>"))
                .finish(),
        }
    }
}

// == Is Expired ==
/// True when the entry carries an expiry strictly before `now`.
pub fn is_expired<V>(entry: &CacheEntry<V>, now: u64) -> bool {
    matches!(entry.ttl_expiry, Some(expiry) if expiry < now)
}

// == Invalidator ==
/// A validated invalidation policy.
#[derive(Debug, Clone)]
pub struct Invalidator {
    policy: InvalidationPolicy,
}

impl Invalidator {
    /// Validates `policy`; event invalidation needs a predicate.
    pub fn new(policy: InvalidationPolicy) -> Result<Self> {
        if let InvalidationPolicy::Event { predicate: None } = policy {
            return Err(CacheError::InvalidPolicyConfiguration(
                "EVENT invalidation requires a predicate".to_string(),
            ));
        }
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &InvalidationPolicy {
        &self.policy
    }

    // == Expiry For ==
    /// Absolute expiry for an entry admitted at `now`.
    pub fn expiry_for(&self, now: u64, ttl: Option<Duration>) -> Option<u64> {
        match &self.policy {
            InvalidationPolicy::Ttl { default_ttl } => ttl
                .or(*default_ttl)
                .map(|ttl| now.saturating_add(ttl.as_millis() as u64)),
            _ => None,
        }
    }

    // == Is Stale ==
    /// Applies the configured policy to `entry`.
    pub fn is_stale<V>(&self, entry: &CacheEntry<V>, now: u64) -> bool {
        match &self.policy {
            InvalidationPolicy::None => false,
            InvalidationPolicy::Ttl { .. } => is_expired(entry, now),
            InvalidationPolicy::Event { predicate } => {
                predicate.as_ref().is_some_and(|stale| stale(&entry.key))
            }
        }
    }
}
