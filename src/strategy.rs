//! Batching/spin strategy selection.
//!
//! The strategy reshapes the event ring's consumer behavior (batch size, spin
//! iterations, sleep) around the size of the watched set. In `Auto` mode the
//! effective strategy is re-derived whenever a file is watched or unwatched.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Consumer optimization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStrategy {
    /// Resolve from the watched-file count at runtime
    Auto,
    /// Lowest latency: one event per drain, aggressive spinning
    SingleEvent,
    /// Small batches, moderate spinning
    SmallBatch,
    /// Large batches for high fan-in
    LargeBatch,
}

impl std::fmt::Display for OptimizationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizationStrategy::Auto => write!(f, "auto"),
            OptimizationStrategy::SingleEvent => write!(f, "single_event"),
            OptimizationStrategy::SmallBatch => write!(f, "small_batch"),
            OptimizationStrategy::LargeBatch => write!(f, "large_batch"),
        }
    }
}

impl std::str::FromStr for OptimizationStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "auto" => Ok(OptimizationStrategy::Auto),
            "singleevent" | "single" => Ok(OptimizationStrategy::SingleEvent),
            "smallbatch" | "small" => Ok(OptimizationStrategy::SmallBatch),
            "largebatch" | "large" => Ok(OptimizationStrategy::LargeBatch),
            _ => Err(()),
        }
    }
}

/// Watched-count thresholds for `Auto` resolution.
const SMALL_BATCH_MIN: usize = 4;
const LARGE_BATCH_MIN: usize = 21;

/// Resolve the effective strategy.
///
/// A non-`Auto` configuration always wins; `Auto` maps the watched-file
/// count over the thresholds {3, 20}. The result is never `Auto`.
pub fn select(watched_count: usize, configured: OptimizationStrategy) -> OptimizationStrategy {
    if configured != OptimizationStrategy::Auto {
        return configured;
    }
    if watched_count >= LARGE_BATCH_MIN {
        OptimizationStrategy::LargeBatch
    } else if watched_count >= SMALL_BATCH_MIN {
        OptimizationStrategy::SmallBatch
    } else {
        OptimizationStrategy::SingleEvent
    }
}

/// Consumer tuning derived from a (resolved) strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyParams {
    /// Maximum events drained per `drain_batch` call
    pub max_batch: usize,
    /// Empty-ring spins before yielding or sleeping
    pub spin_iters: u32,
    /// Sleep once spinning is exhausted; zero means yield only
    pub sleep: Duration,
}

impl StrategyParams {
    /// Tuning table. `Auto` resolves as an empty watched set (single-event)
    /// so that a ring constructed before any watch behaves sanely.
    pub fn for_strategy(strategy: OptimizationStrategy) -> Self {
        match strategy {
            OptimizationStrategy::SingleEvent | OptimizationStrategy::Auto => StrategyParams {
                max_batch: 1,
                spin_iters: 1000,
                sleep: Duration::ZERO,
            },
            OptimizationStrategy::SmallBatch => StrategyParams {
                max_batch: 8,
                spin_iters: 200,
                sleep: Duration::from_micros(500),
            },
            OptimizationStrategy::LargeBatch => StrategyParams {
                max_batch: 64,
                spin_iters: 50,
                sleep: Duration::from_micros(500),
            },
        }
    }
}

/// Default ring capacity for a configured strategy when the user leaves
/// `event_ring_capacity` at 0 (auto).
pub fn default_ring_capacity(configured: OptimizationStrategy) -> usize {
    match configured {
        OptimizationStrategy::Auto | OptimizationStrategy::SingleEvent => 64,
        OptimizationStrategy::SmallBatch => 128,
        OptimizationStrategy::LargeBatch => 256,
    }
}
