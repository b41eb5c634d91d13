//! Downstream sink abstraction.
//!
//! The `BlockSink` trait decouples the transfer loop from whatever renders or
//! encodes the audio (a media pipeline, a file, a channel to another task).
//!
//! `&mut self` on `output` lets sinks keep state (open writers, counters).
//! Access is serialised through `SinkHandle`'s `parking_lot::Mutex`.

pub mod channel;
pub mod wav;

pub use channel::ChannelSink;
pub use wav::WavSink;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffering::AudioBlock;
use crate::error::Result;

/// Contract for downstream consumers of drained blocks.
pub trait BlockSink: Send + 'static {
    /// Take one block. Called on the transfer thread, never on the
    /// real-time thread, so it may block or allocate.
    ///
    /// The block's channel buffers are only valid during this call.
    ///
    /// # Errors
    /// The transfer loop logs and counts the error, then moves on to the
    /// next block.
    fn output(&mut self, block: &AudioBlock<'_>) -> Result<()>;

    /// Flush and close. Called once when the transfer loop exits.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Thread-safe reference-counted handle to any `BlockSink` implementor.
#[derive(Clone)]
pub struct SinkHandle(pub Arc<Mutex<dyn BlockSink>>);

impl SinkHandle {
    /// Wrap any `BlockSink` in a `SinkHandle`.
    pub fn new<S: BlockSink>(sink: S) -> Self {
        Self(Arc::new(Mutex::new(sink)))
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle").finish_non_exhaustive()
    }
}
