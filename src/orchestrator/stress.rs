//! Bulk fill
//!
//! Inserts synthetic entries directly into the cache until a ceiling is
//! reached or a stop is requested. Used to watch eviction under pressure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Orchestrator;
use crate::cache::EventKind;
use crate::error::{CacheError, Result};
use crate::store::Item;

/// Iteration ceiling applied on top of any caller-supplied limit.
pub const MAX_BULK_FILL_ITERATIONS: u64 = 10_000;

// == Stop Signal ==
/// Cooperative cancellation flag shared between a running fill and whoever
/// wants to stop it.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arms the signal for the next run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// == Fill Control ==
/// Admits one bulk fill at a time and owns the stop signal aimed at it.
#[derive(Debug, Clone, Default)]
pub struct FillControl {
    running: Arc<AtomicBool>,
    stop: StopSignal,
}

impl FillControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the single fill slot and re-arms the stop signal.
    ///
    /// Fails with [`CacheError::FillInProgress`] while another run holds it;
    /// the running fill's stop signal is left untouched.
    pub fn begin(&self) -> Result<FillRun> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CacheError::FillInProgress);
        }
        self.stop.reset();
        Ok(FillRun {
            running: Arc::clone(&self.running),
            stop: self.stop.clone(),
        })
    }

    /// Asks the running fill, if any, to stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// The slot held by a running fill. Dropping it frees the slot.
#[derive(Debug)]
pub struct FillRun {
    running: Arc<AtomicBool>,
    stop: StopSignal,
}

impl FillRun {
    pub fn signal(&self) -> &StopSignal {
        &self.stop
    }
}

impl Drop for FillRun {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

// == Options ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkFillOptions {
    /// Ceiling on insertions, capped at [`MAX_BULK_FILL_ITERATIONS`]
    pub max_iterations: u64,
    pub min_size: u64,
    pub max_size: u64,
    /// Seed for the size generator
    pub seed: Option<u64>,
    /// Stop early once this many evictions happened
    pub target_evictions: Option<u64>,
}

impl Default for BulkFillOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5_000,
            min_size: 600,
            max_size: 1_200,
            seed: None,
            target_evictions: None,
        }
    }
}

// == Report ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFillReport {
    pub iterations: u64,
    pub inserted: u64,
    pub evictions: u64,
    /// The fill ended because of the stop signal
    pub stopped: bool,
    pub current_bytes: u64,
    pub capacity_bytes: u64,
}

impl Orchestrator {
    // == Bulk Fill ==
    /// Inserts `stress-N` entries of random size until the iteration ceiling,
    /// the eviction target or a stop request. The ceiling never exceeds
    /// [`MAX_BULK_FILL_ITERATIONS`].
    ///
    /// Each insertion takes the cache lock separately and yields afterwards,
    /// so other requests interleave with a running fill.
    pub async fn bulk_fill(
        &self,
        options: &BulkFillOptions,
        stop: &StopSignal,
    ) -> Result<BulkFillReport> {
        if options.min_size > options.max_size {
            return Err(CacheError::InvalidRequest(format!(
                "minSize {} is larger than maxSize {}",
                options.min_size, options.max_size
            )));
        }
        if options.max_size > self.capacity_bytes {
            return Err(CacheError::ItemTooLarge {
                size: options.max_size,
                capacity: self.capacity_bytes,
            });
        }

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut report = BulkFillReport {
            iterations: 0,
            inserted: 0,
            evictions: 0,
            stopped: false,
            current_bytes: 0,
            capacity_bytes: self.capacity_bytes,
        };

        let max_iterations = options.max_iterations.min(MAX_BULK_FILL_ITERATIONS);
        info!(
            "Bulk fill started: up to {} items of {}..={} bytes",
            max_iterations, options.min_size, options.max_size
        );

        while report.iterations < max_iterations {
            if stop.is_stopped() {
                report.stopped = true;
                break;
            }
            if options
                .target_evictions
                .is_some_and(|target| report.evictions >= target)
            {
                break;
            }

            let size = rng.gen_range(options.min_size..=options.max_size);
            let seq = self.stress_seq.fetch_add(1, Ordering::Relaxed);
            let item = Item {
                id: format!("stress-{}", seq),
                name: format!("Stress item #{}", seq),
                price: 0.0,
                category: "Stress".to_string(),
                stock: 0,
                size_bytes: size,
            };

            {
                let mut state = self.state.lock().await;
                let evicted = state.engine.put(item.id.clone(), item.clone(), size, None)?;
                let add = state.event(EventKind::Add, &item.id, item.name);
                state.record_batch(add);

                report.inserted += 1;
                report.evictions += evicted.len() as u64;
            }
            report.iterations += 1;

            tokio::task::yield_now().await;
        }

        report.current_bytes = self.state.lock().await.engine.size();
        info!(
            "Bulk fill finished: {} inserted, {} evictions, {}/{} bytes{}",
            report.inserted,
            report.evictions,
            report.current_bytes,
            report.capacity_bytes,
            if report.stopped { " (stopped)" } else { "" }
        );
        Ok(report)
    }
}
