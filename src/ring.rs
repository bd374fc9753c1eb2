//! Fixed-capacity MPSC event ring.
//!
//! Vyukov-style bounded queue: every slot carries its own sequence number,
//! so producers coordinate through a compare-and-swap on the write sequence
//! and a release-store on the slot, with no central mutex and no allocation
//! after construction. Publishing into a full ring drops the event and
//! bumps a counter instead of blocking; the polling producers must never
//! suspend.
//!
//! Single consumer: `drain_batch` and `run_consumer` must only ever be
//! called from one thread at a time. The read sequence is written with
//! plain stores on that assumption.
//!
//! Sequence lifecycle for the slot at index `i` with capacity `N`:
//! slots start at `seq = i`; a producer that reserved position `pos` stamps
//! `pos + 1` after writing the payload; the consumer re-stamps `pos + N`
//! after copying it out, which marks the slot writable for the producer at
//! position `pos + N`. Events are delivered strictly in the order of their
//! reserved sequence numbers.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::error::WatchError;
use crate::error_codes;
use crate::event::FileChangeEvent;
use crate::strategy::{self, OptimizationStrategy, StrategyParams};

/// Smallest permitted ring capacity.
pub const MIN_RING_CAPACITY: usize = 64;

/// Outcome of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Event occupies a slot and will be delivered exactly once
    Accepted,
    /// Ring was full; event dropped, counter incremented
    Full,
}

/// Counters exposed for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStats {
    /// Accepted publishes
    pub published: u64,
    /// Events handed to the consumer callback
    pub consumed: u64,
    /// Publishes rejected because the ring was full
    pub dropped: u64,
    /// Slot count
    pub capacity: usize,
}

struct Slot {
    sequence: AtomicU64,
    event: UnsafeCell<FileChangeEvent>,
}

/// Fixed-capacity multi-producer single-consumer ring of
/// [`FileChangeEvent`]s.
pub struct EventRing {
    slots: Box<[Slot]>,
    capacity_mask: u64,
    write_seq: AtomicU64,
    read_seq: AtomicU64,
    running: AtomicBool,
    published: AtomicU64,
    consumed: AtomicU64,
    dropped: AtomicU64,
    configured: OptimizationStrategy,
    effective: AtomicU8,
}

// SAFETY: slots are plain byte-copyable payloads guarded by their sequence
// numbers. A producer writes a slot's event only between winning the
// write_seq CAS for that position and release-storing the slot sequence; the
// consumer reads it only after an acquire-load observes that store. The two
// accesses are therefore ordered and never overlap.
unsafe impl Sync for EventRing {}
unsafe impl Send for EventRing {}

impl EventRing {
    /// Build a ring. Capacity must be a power of two of at least
    /// [`MIN_RING_CAPACITY`]; violations are configuration errors.
    pub fn with_capacity(
        capacity: usize,
        configured: OptimizationStrategy,
    ) -> Result<Self, WatchError> {
        if capacity < MIN_RING_CAPACITY || !capacity.is_power_of_two() {
            return Err(WatchError::InvalidConfig {
                code: error_codes::ARGUS_INVALID_BOREAS_CAPACITY,
                message: format!(
                    "event ring capacity must be a power of two >= {}, got {}",
                    MIN_RING_CAPACITY, capacity
                ),
            });
        }

        let slots: Box<[Slot]> = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicU64::new(i as u64),
                event: UnsafeCell::new(FileChangeEvent::zeroed()),
            })
            .collect();

        let effective = strategy::select(0, configured);
        Ok(EventRing {
            slots,
            capacity_mask: capacity as u64 - 1,
            write_seq: AtomicU64::new(0),
            read_seq: AtomicU64::new(0),
            running: AtomicBool::new(true),
            published: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            configured,
            effective: AtomicU8::new(strategy_to_u8(effective)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity_mask as usize + 1
    }

    /// Publish an event. Wait-free for a lone producer, lock-free under
    /// contention; never blocks and never allocates. A full ring drops the
    /// event and increments the `dropped` counter.
    pub fn publish(&self, event: FileChangeEvent) -> PublishOutcome {
        let mut pos = self.write_seq.load(Ordering::Acquire);
        loop {
            let slot = &self.slots[(pos & self.capacity_mask) as usize];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq as i64 - pos as i64;

            if diff == 0 {
                // Slot is writable for this position; try to reserve it.
                match self.write_seq.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS reserved position `pos` for this
                        // producer exclusively; the consumer cannot touch the
                        // slot until the release-store below.
                        unsafe {
                            slot.event.get().write(event);
                        }
                        slot.sequence.store(pos + 1, Ordering::Release);
                        self.published.fetch_add(1, Ordering::Relaxed);
                        return PublishOutcome::Accepted;
                    }
                    Err(actual) => pos = actual,
                }
            } else if diff < 0 {
                // Slot still holds an unconsumed event one lap behind.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return PublishOutcome::Full;
            } else {
                // Another producer advanced past us; reload and retry.
                pos = self.write_seq.load(Ordering::Acquire);
            }
        }
    }

    /// Pop one event if ready. Single-consumer only.
    fn try_consume(&self) -> Option<FileChangeEvent> {
        let pos = self.read_seq.load(Ordering::Relaxed);
        let slot = &self.slots[(pos & self.capacity_mask) as usize];
        let seq = slot.sequence.load(Ordering::Acquire);
        if seq != pos + 1 {
            return None;
        }
        // SAFETY: the acquire-load above observed the producer's release
        // store for this position, so the payload is fully written and no
        // producer may reuse the slot until we re-stamp it below.
        let event = unsafe { *slot.event.get() };
        slot.sequence
            .store(pos + self.capacity() as u64, Ordering::Release);
        self.read_seq.store(pos + 1, Ordering::Release);
        self.consumed.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    /// Drain up to the strategy's batch size, invoking `deliver` per event.
    /// Returns the number of events dispatched. Single-consumer only.
    pub fn drain_batch(&self, deliver: &mut dyn FnMut(FileChangeEvent)) -> usize {
        let params = self.params();
        let mut count = 0;
        while count < params.max_batch {
            match self.try_consume() {
                Some(event) => {
                    deliver(event);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Consumer loop: repeatedly drain with the strategy's spin/yield/sleep
    /// backoff until [`stop`](Self::stop) is observed, then return after the
    /// batch in flight. Blocks the calling thread for the ring's lifetime;
    /// single-consumer only.
    pub fn run_consumer(&self, mut deliver: impl FnMut(FileChangeEvent)) {
        let mut idle_spins: u32 = 0;
        while self.running.load(Ordering::Acquire) {
            let drained = self.drain_batch(&mut deliver);
            if drained > 0 {
                idle_spins = 0;
                continue;
            }
            let params = self.params();
            idle_spins = idle_spins.saturating_add(1);
            if idle_spins < params.spin_iters {
                std::hint::spin_loop();
            } else if params.sleep.is_zero() {
                std::thread::yield_now();
            } else {
                std::thread::sleep(params.sleep);
            }
        }
    }

    /// Signal the consumer to exit after the batch it is currently draining.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Recompute the effective strategy from the watched-file count. Only
    /// meaningful in `Auto`; an explicit configuration is left alone. The
    /// consumer observes the new value on its next `drain_batch`.
    pub fn adapt_strategy(&self, watched_count: usize) {
        if self.configured != OptimizationStrategy::Auto {
            return;
        }
        let resolved = strategy::select(watched_count, OptimizationStrategy::Auto);
        self.effective
            .store(strategy_to_u8(resolved), Ordering::Release);
    }

    /// Currently effective (resolved) strategy.
    pub fn effective_strategy(&self) -> OptimizationStrategy {
        strategy_from_u8(self.effective.load(Ordering::Acquire))
    }

    fn params(&self) -> StrategyParams {
        StrategyParams::for_strategy(self.effective_strategy())
    }

    /// Number of accepted events not yet consumed.
    pub fn occupancy(&self) -> u64 {
        let published = self.published.load(Ordering::Acquire);
        let consumed = self.consumed.load(Ordering::Acquire);
        published.saturating_sub(consumed)
    }

    /// Counter snapshot. `published` is loaded before `consumed`, so
    /// `published - consumed` never overestimates occupancy (it can go
    /// negative under a racing consumer; subtract saturating).
    pub fn stats(&self) -> RingStats {
        RingStats {
            published: self.published.load(Ordering::Acquire),
            consumed: self.consumed.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            capacity: self.capacity(),
        }
    }
}

fn strategy_to_u8(strategy: OptimizationStrategy) -> u8 {
    match strategy {
        OptimizationStrategy::Auto => 0,
        OptimizationStrategy::SingleEvent => 1,
        OptimizationStrategy::SmallBatch => 2,
        OptimizationStrategy::LargeBatch => 3,
    }
}

fn strategy_from_u8(value: u8) -> OptimizationStrategy {
    match value {
        1 => OptimizationStrategy::SingleEvent,
        2 => OptimizationStrategy::SmallBatch,
        3 => OptimizationStrategy::LargeBatch,
        _ => OptimizationStrategy::Auto,
    }
}
