//! Blocking transfer loop: ring → downstream sink.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Check the running flag; exit when cleared
//! 2. Ring drained? sleep `idle_poll` and retry (the only voluntary wait)
//! 3. Under the ring's shared lock: pick slot[read % n], wrap it in an
//!    AudioBlock (layout, rate, ns timestamp), hand it to the sink
//! 4. Advance read_index
//! ```
//!
//! Runs on its own OS thread for the lifetime of the session. The sink may
//! block; only this loop waits on it, never the producer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    buffering::{AudioBlock, BlockRing, Drain, RingDiagnostics},
    layout::SpeakerLayout,
    sink::SinkHandle,
    timebase::host_to_downstream,
};

/// All context the transfer loop needs, passed as one struct so the spawn
/// closure stays tidy.
pub struct TransferContext {
    pub ring: Arc<BlockRing>,
    pub sink: SinkHandle,
    pub running: Arc<AtomicBool>,
    pub idle_poll: Duration,
}

/// Run the transfer loop until `ctx.running` becomes false, then finish the sink.
pub fn run(ctx: TransferContext) {
    info!(idle_poll_ms = ctx.idle_poll.as_millis() as u64, "transfer loop started");

    let layout = SpeakerLayout::from_channel_count(ctx.ring.channels());
    let sample_rate = ctx.ring.sample_rate();
    if !layout.is_known() {
        warn!(
            channels = ctx.ring.channels(),
            "no speaker layout for this channel count"
        );
    }
    let diagnostics = ctx.ring.diagnostics();

    loop {
        if !ctx.running.load(Ordering::Acquire) {
            break;
        }

        if ctx.ring.is_drained() {
            RingDiagnostics::bump(&diagnostics.idle_polls, 1);
            thread::sleep(ctx.idle_poll);
            continue;
        }

        let dropped_before = diagnostics.blocks_dropped.load(Ordering::Relaxed);
        let outcome = ctx.ring.read_block(|slot, sequence| {
            let block = AudioBlock::new(
                layout,
                sample_rate,
                slot.frames(),
                host_to_downstream(slot.host_time()),
                sequence,
                slot.planes(),
            );
            ctx.sink.0.lock().output(&block)
        });

        let dropped = diagnostics.blocks_dropped.load(Ordering::Relaxed) - dropped_before;
        if dropped > 0 {
            debug!(dropped, "producer overran the ring; oldest blocks discarded");
        }

        match outcome {
            Drain::Delivered(Ok(())) | Drain::Skipped => {}
            Drain::Delivered(Err(e)) => {
                RingDiagnostics::bump(&diagnostics.sink_errors, 1);
                warn!("sink rejected block: {e}");
            }
            // Cursor moved under us (resize) or the store is gone.
            Drain::Empty => thread::sleep(ctx.idle_poll),
        }
    }

    if let Err(e) = ctx.sink.0.lock().finish() {
        warn!("sink finish failed: {e}");
    }
    info!("transfer loop stopped");
}
