//! Ring Buffer Controller: cursors, slot selection and resize.
//!
//! ```text
//!            write_index ──► slot[w % n]          (producer, RT callback)
//!  BlockStore[n slots]
//!            read_index  ──► slot[r % n] ──► sink (transfer thread)
//! ```
//!
//! ## Locking discipline
//!
//! - The store sits behind a `RwLock`. The transfer loop holds it shared
//!   while handing one block to the sink; `resize` holds it exclusively.
//! - The producer only ever uses `try_read` / `try_lock`. If either fails it
//!   gives up on the cycle and bumps `writes_rejected`. It never waits.
//!   A busy slot still consumes its index, so a stalled sink costs at most
//!   one slot per lap and never freezes the write cursor.
//! - The host guarantees `resize` and the producer never overlap, so in
//!   steady state the producer's `try_read` always succeeds.
//!
//! ## Overrun
//!
//! The producer never waits for the consumer. When it laps the reader it
//! overwrites the oldest unread slot. The consumer notices (`write - read >
//! n`), jumps forward to the oldest block still in the ring and counts the
//! skipped ones in `blocks_dropped`. Every slot records the logical index
//! and store generation it was written for, so a lapped or pre-resize slot
//! is never delivered.

pub mod block;
pub mod diagnostics;
pub mod slot;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Result;

pub use block::{AudioBlock, OwnedBlock, SampleFormat};
pub use diagnostics::{DiagnosticsSnapshot, RingDiagnostics};
pub use slot::{item_count_for, BlockSlot, BlockStore};

/// What happened to one producer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// The block was stored in full.
    Written,
    /// Stored, but the host handed over more frames than the slot holds.
    Truncated,
    /// The store or the target slot was busy; the block was dropped. On a
    /// busy slot the write cursor still advances past the lost index.
    Rejected,
    /// No store exists (not created yet, destroyed, or a resize failed).
    NoStorage,
}

impl CycleStatus {
    pub fn is_stored(self) -> bool {
        matches!(self, CycleStatus::Written | CycleStatus::Truncated)
    }
}

/// Result of one consumer step.
#[derive(Debug, PartialEq, Eq)]
pub enum Drain<R> {
    /// Nothing unread.
    Empty,
    /// The slot at the read cursor was overwritten before it could be read.
    Skipped,
    /// The block was handed to the callback, which returned `R`.
    Delivered(R),
}

/// Single-producer / single-consumer ring of audio blocks.
pub struct BlockRing {
    store: RwLock<BlockStore>,
    write_index: AtomicU64,
    read_index: AtomicU64,
    sample_rate: u32,
    channels: usize,
    diagnostics: RingDiagnostics,
}

impl BlockRing {
    /// A ring with no storage yet. Call [`create`](Self::create) before use.
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            store: RwLock::new(BlockStore::empty(channels, 0)),
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
            sample_rate,
            channels,
            diagnostics: RingDiagnostics::default(),
        }
    }

    /// Allocate the initial store for blocks of `block_frames`.
    pub fn create(&self, block_frames: u32) -> Result<()> {
        self.rebuild(block_frames)
    }

    /// Discard everything queued and recreate the store for `block_frames`.
    ///
    /// Must only be called from the reconfiguration path. Waits for the
    /// transfer loop to finish its current hand-off.
    ///
    /// # Errors
    /// `JacklineError::ResourceExhausted` if the new store can't be
    /// allocated. The ring is then left with no storage.
    pub fn resize(&self, block_frames: u32) -> Result<()> {
        self.rebuild(block_frames)?;
        RingDiagnostics::bump(&self.diagnostics.resizes, 1);
        Ok(())
    }

    /// Release all slot memory and reset both cursors.
    pub fn destroy(&self) {
        let mut store = self.store.write();
        store.destroy();
        self.reset_cursors();
    }

    fn rebuild(&self, block_frames: u32) -> Result<()> {
        let mut store = self.store.write();
        let generation = store.generation() + 1;
        store.destroy();
        self.reset_cursors();

        let items = item_count_for(self.sample_rate, block_frames);
        match BlockStore::create(items, self.channels, block_frames as usize, generation) {
            Ok(fresh) => {
                *store = fresh;
                Ok(())
            }
            Err(e) => {
                *store = BlockStore::empty(self.channels, generation);
                Err(e)
            }
        }
    }

    fn reset_cursors(&self) {
        self.write_index.store(0, Ordering::Release);
        self.read_index.store(0, Ordering::Release);
    }

    // ── Producer ─────────────────────────────────────────────────────────

    /// Copy one cycle into the slot at `write_index` and publish it.
    ///
    /// Real-time safe: no allocation, no blocking, no logging.
    pub fn write_block<S: AsRef<[f32]>>(
        &self,
        sources: &[S],
        frames: usize,
        host_time: u64,
    ) -> CycleStatus {
        let Some(store) = self.store.try_read() else {
            RingDiagnostics::bump(&self.diagnostics.writes_rejected, 1);
            return CycleStatus::Rejected;
        };

        let write = self.write_index.load(Ordering::Relaxed);
        let Some(slot) = store.slot_for_write(write) else {
            return CycleStatus::NoStorage;
        };
        let Some(mut slot) = slot.try_lock() else {
            // The consumer is handing this slot to the sink. Give up the
            // index so later cycles land on fresh slots; the consumer sees
            // the slot doesn't hold it and counts it as dropped.
            self.write_index.store(write + 1, Ordering::Release);
            RingDiagnostics::bump(&self.diagnostics.writes_rejected, 1);
            return CycleStatus::Rejected;
        };

        let stored = slot.write(sources, frames, host_time, write, store.generation());
        drop(slot);

        // Slot contents must be visible before the cursor moves.
        self.write_index.store(write + 1, Ordering::Release);
        RingDiagnostics::bump(&self.diagnostics.blocks_written, 1);

        if stored < frames {
            RingDiagnostics::bump(&self.diagnostics.frames_truncated, (frames - stored) as u64);
            CycleStatus::Truncated
        } else {
            CycleStatus::Written
        }
    }

    // ── Consumer ─────────────────────────────────────────────────────────

    /// Hand the oldest unread block to `deliver` and advance `read_index`.
    ///
    /// The shared lock is held for the whole call, so `deliver` may take as
    /// long as it likes without racing a resize; a pending resize waits.
    pub fn read_block<R>(&self, deliver: impl FnOnce(&BlockSlot, u64) -> R) -> Drain<R> {
        let store = self.store.read();
        let n = store.item_count() as u64;
        let write = self.write_index.load(Ordering::Acquire);
        let mut read = self.read_index.load(Ordering::Relaxed);
        if n == 0 || read >= write {
            return Drain::Empty;
        }

        if write - read > n {
            let oldest = write - n;
            RingDiagnostics::bump(&self.diagnostics.blocks_dropped, oldest - read);
            read = oldest;
            self.read_index.store(read, Ordering::Release);
        }

        let Some(slot) = store.slot_for_read(read) else {
            return Drain::Empty;
        };
        let slot = slot.lock();
        debug_assert!(
            slot.sequence().is_none() || slot.generation() == store.generation(),
            "slot from a previous store generation survived a resize"
        );

        if !slot.holds(read, store.generation()) {
            // Lapped by the producer between the cursor load and the lock.
            drop(slot);
            self.read_index.store(read + 1, Ordering::Release);
            RingDiagnostics::bump(&self.diagnostics.blocks_dropped, 1);
            return Drain::Skipped;
        }

        let out = deliver(&slot, read);
        drop(slot);
        self.read_index.store(read + 1, Ordering::Release);
        RingDiagnostics::bump(&self.diagnostics.blocks_delivered, 1);
        Drain::Delivered(out)
    }

    // ── Observers ────────────────────────────────────────────────────────

    /// `true` when every written block has been read. Lock-free.
    pub fn is_drained(&self) -> bool {
        self.read_index.load(Ordering::Acquire) >= self.write_index.load(Ordering::Acquire)
    }

    pub fn write_index(&self) -> u64 {
        self.write_index.load(Ordering::Acquire)
    }

    pub fn read_index(&self) -> u64 {
        self.read_index.load(Ordering::Acquire)
    }

    pub fn item_count(&self) -> usize {
        self.store.read().item_count()
    }

    pub fn frame_capacity(&self) -> usize {
        self.store.read().frame_capacity()
    }

    pub fn generation(&self) -> u64 {
        self.store.read().generation()
    }

    pub fn has_storage(&self) -> bool {
        !self.store.read().is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn diagnostics(&self) -> &RingDiagnostics {
        &self.diagnostics
    }
}

impl std::fmt::Debug for BlockRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRing")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("write_index", &self.write_index())
            .field("read_index", &self.read_index())
            .finish_non_exhaustive()
    }
}
