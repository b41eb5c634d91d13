//! Host-facing callbacks: the per-cycle producer and the block-size handler.
//!
//! # Real-time contract
//!
//! [`CycleHandler::process`] runs on the audio server's processing thread.
//! It **must not** allocate, log, block on a lock, or perform I/O. It only
//! copies into a pre-allocated slot and bumps atomics.
//!
//! [`CycleHandler::block_size_changed`] runs whenever the server renegotiates
//! its block size. The host guarantees it never runs at the same time as
//! `process`; that is the only reason the producer can get away with
//! `try_read` on the store lock.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::buffering::{BlockRing, CycleStatus};
use crate::engine::SessionShared;
use crate::error::{JacklineError, Result};
use crate::ipc::events::SessionStatus;

/// Cloneable handle the host driver calls into from its own threads.
#[derive(Clone)]
pub struct CycleHandler {
    ring: Arc<BlockRing>,
    shared: Arc<SessionShared>,
}

impl CycleHandler {
    pub(crate) fn new(ring: Arc<BlockRing>, shared: Arc<SessionShared>) -> Self {
        Self { ring, shared }
    }

    /// Producer path: store one cycle of planar channel buffers.
    ///
    /// `channels[i]` is the buffer of input port `i`; `host_time` is the
    /// host's timestamp (µs) of the last processed frame.
    #[inline]
    pub fn process<S: AsRef<[f32]>>(
        &self,
        frames: u32,
        channels: &[S],
        host_time: u64,
    ) -> CycleStatus {
        self.ring.write_block(channels, frames as usize, host_time)
    }

    /// Reconfiguration: rebuild the ring for a new block size.
    ///
    /// A no-op when `frames` equals the current size. Otherwise all queued
    /// audio is discarded. If the new store can't be allocated the session
    /// is failed: the transfer loop is told to stop and status goes to
    /// `Failed`. `shutdown()` still cleans up.
    pub fn block_size_changed(&self, frames: u32) -> Result<()> {
        if self.shared.failed.load(Ordering::Acquire) {
            return Err(JacklineError::SessionFailed);
        }
        if frames == 0 {
            warn!("ignoring block size change to 0 frames");
            return Err(JacklineError::InvalidBlockSize(frames));
        }

        let current = self.shared.block_frames.load(Ordering::Acquire);
        if frames == current {
            return Ok(());
        }
        info!("block size went from {} to {}", current, frames);

        match self.ring.resize(frames) {
            Ok(()) => {
                self.shared.block_frames.store(frames, Ordering::Release);
                self.shared.set_status(
                    SessionStatus::Resized,
                    Some(format!("block size {current} -> {frames}")),
                );
                Ok(())
            }
            Err(e) => {
                error!("resize to {frames} frames failed, stopping session: {e}");
                self.shared.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Current negotiated block size.
    pub fn block_frames(&self) -> u32 {
        self.shared.block_frames.load(Ordering::Acquire)
    }

    pub fn ring(&self) -> &Arc<BlockRing> {
        &self.ring
    }
}

impl std::fmt::Debug for CycleHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleHandler")
            .field("ring", &self.ring)
            .field("block_frames", &self.block_frames())
            .finish()
    }
}
