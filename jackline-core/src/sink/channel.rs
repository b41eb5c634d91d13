//! Sink that forwards owned copies of each block over a crossbeam channel.

use crossbeam_channel::{Receiver, Sender};

use crate::buffering::{AudioBlock, OwnedBlock};
use crate::error::{JacklineError, Result};
use crate::sink::BlockSink;

/// Copies every block out of the ring and sends it to a receiver.
///
/// With a bounded channel a slow receiver blocks the transfer loop, which
/// in turn lets the ring overrun. The producer is never affected.
pub struct ChannelSink {
    tx: Sender<OwnedBlock>,
}

impl ChannelSink {
    pub fn new(tx: Sender<OwnedBlock>) -> Self {
        Self { tx }
    }

    pub fn bounded(capacity: usize) -> (Self, Receiver<OwnedBlock>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }

    pub fn unbounded() -> (Self, Receiver<OwnedBlock>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }
}

impl BlockSink for ChannelSink {
    fn output(&mut self, block: &AudioBlock<'_>) -> Result<()> {
        self.tx
            .send(block.to_owned_block())
            .map_err(|_| JacklineError::Sink("channel receiver disconnected".into()))
    }
}
