//! In-flight fetch tracking
//!
//! One backing-store fetch per missing key. The first caller becomes the
//! leader and performs the fetch; later callers for the same key wait on the
//! leader's result instead of fetching again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::{CacheError, Result};
use crate::store::Item;

/// What the leader publishes: the fetched item, or the error text.
pub(crate) type FetchResult = std::result::Result<Option<Item>, String>;

type Slot = watch::Receiver<Option<FetchResult>>;

// == Loading Set ==
/// Cloning shares the same set of in-flight keys.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoadingSet {
    in_flight: Arc<Mutex<HashMap<String, Slot>>>,
}

pub(crate) enum Claim {
    /// No fetch was outstanding; the caller must perform it
    Leader(LoadGuard),
    /// A fetch is outstanding; wait on it
    Follower(Follower),
}

impl LoadingSet {
    // == Claim ==
    /// Registers interest in `id`.
    pub fn claim(&self, id: &str) -> Claim {
        let mut in_flight = self.lock();
        if let Some(slot) = in_flight.get(id) {
            return Claim::Follower(Follower {
                id: id.to_string(),
                slot: slot.clone(),
            });
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(id.to_string(), rx);
        Claim::Leader(LoadGuard {
            set: self.clone(),
            id: id.to_string(),
            tx,
        })
    }

    pub fn is_loading(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn loading_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn release(&self, id: &str) {
        self.lock().remove(id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// == Load Guard ==
/// Held by whoever performs the fetch. Dropping it clears the LOADING mark;
/// followers still waiting then see the fetch as abandoned.
pub(crate) struct LoadGuard {
    set: LoadingSet,
    id: String,
    tx: watch::Sender<Option<FetchResult>>,
}

impl LoadGuard {
    /// Publishes the result to waiting followers and clears the mark.
    pub fn complete(self, result: FetchResult) {
        self.tx.send_replace(Some(result));
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.set.release(&self.id);
    }
}

// == Follower ==
pub(crate) struct Follower {
    id: String,
    slot: Slot,
}

impl Follower {
    /// Waits for the leader's result.
    pub async fn wait(mut self) -> Result<Option<Item>> {
        let result = match self.slot.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => None,
        };

        match result {
            Some(Ok(item)) => Ok(item),
            Some(Err(message)) => Err(CacheError::Backing(message)),
            None => Err(CacheError::Internal(format!(
                "in-flight fetch for '{}' was abandoned",
                self.id
            ))),
        }
    }
}
