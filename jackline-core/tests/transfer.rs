use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use jackline_core::buffering::BlockRing;
use jackline_core::engine::transfer::{self, TransferContext};
use jackline_core::error::Result;
use jackline_core::{AudioBlock, BlockSink, ChannelSink, CycleStatus, OwnedBlock, SinkHandle};

/// Forwards to a channel after a fixed delay, to play a slow downstream.
struct SlowSink {
    inner: ChannelSink,
    delay: Duration,
}

impl BlockSink for SlowSink {
    fn output(&mut self, block: &AudioBlock<'_>) -> Result<()> {
        thread::sleep(self.delay);
        self.inner.output(block)
    }
}

fn spawn(ring: &Arc<BlockRing>, sink: SinkHandle) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
    let running = Arc::new(AtomicBool::new(true));
    let ctx = TransferContext {
        ring: Arc::clone(ring),
        sink,
        running: Arc::clone(&running),
        idle_poll: Duration::from_millis(1),
    };
    let handle = thread::Builder::new()
        .name("transfer-test".into())
        .spawn(move || transfer::run(ctx))
        .expect("spawn transfer thread");
    (running, handle)
}

fn collect_until_idle(rx: &crossbeam_channel::Receiver<OwnedBlock>) -> Vec<OwnedBlock> {
    let mut got = Vec::new();
    while let Ok(block) = rx.recv_timeout(Duration::from_millis(200)) {
        got.push(block);
    }
    got
}

fn wait_drained(ring: &BlockRing) {
    let start = Instant::now();
    while !ring.is_drained() {
        assert!(start.elapsed() < Duration::from_secs(2), "ring never drained");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn overrun_keeps_only_the_newest_second() {
    // 48 kHz / 480 frames → 100 slots. 150 cycles land before the
    // consumer starts.
    let ring = Arc::new(BlockRing::new(48_000, 2));
    ring.create(480).unwrap();
    assert_eq!(ring.item_count(), 100);

    for i in 0..150u64 {
        let planes = vec![vec![i as f32; 480], vec![-(i as f32); 480]];
        assert!(ring.write_block(&planes, 480, i * 10_000).is_stored());
    }

    let (sink, rx) = ChannelSink::unbounded();
    let (running, handle) = spawn(&ring, SinkHandle::new(sink));
    let got = collect_until_idle(&rx);
    running.store(false, Ordering::SeqCst);
    handle.join().expect("transfer thread panicked");

    assert_eq!(got.len(), 100);
    for (block, expected) in got.iter().zip(50u64..150) {
        assert_eq!(block.sequence, expected);
        assert_eq!(block.planes[0][0], expected as f32);
        assert_eq!(block.timestamp, expected * 10_000 * 1_000);
    }

    let snap = ring.diagnostics().snapshot();
    assert_eq!(snap.blocks_written, 150);
    assert_eq!(snap.blocks_delivered, 100);
    assert_eq!(snap.blocks_dropped, 50);
}

#[test]
fn resize_never_lets_old_blocks_through() {
    let ring = Arc::new(BlockRing::new(48_000, 1));
    ring.create(480).unwrap();
    for i in 0..20u64 {
        ring.write_block(&[vec![1.0f32; 480]], 480, i);
    }

    let (inner, rx) = ChannelSink::unbounded();
    let sink = SinkHandle::new(SlowSink {
        inner,
        delay: Duration::from_millis(2),
    });
    let (running, handle) = spawn(&ring, sink);

    thread::sleep(Duration::from_millis(10));
    ring.resize(256).unwrap();
    for i in 0..3u64 {
        ring.write_block(&[vec![2.0f32; 256]], 256, 1_000 + i);
    }
    wait_drained(&ring);

    let got = collect_until_idle(&rx);
    running.store(false, Ordering::SeqCst);
    handle.join().expect("transfer thread panicked");

    let first_new = got
        .iter()
        .position(|b| b.frames == 256)
        .expect("post-resize blocks delivered");
    assert!(got[..first_new].iter().all(|b| b.frames == 480));
    let after: Vec<_> = got[first_new..].iter().collect();
    assert_eq!(after.len(), 3);
    for (block, seq) in after.iter().zip(0u64..) {
        assert_eq!(block.frames, 256);
        assert_eq!(block.sequence, seq);
        assert_eq!(block.planes[0][0], 2.0);
    }
}

#[test]
fn slow_sink_never_blocks_the_producer() {
    let ring = Arc::new(BlockRing::new(1_000, 1));
    ring.create(100).unwrap();
    assert_eq!(ring.item_count(), 10);

    let (inner, rx) = ChannelSink::unbounded();
    let sink = SinkHandle::new(SlowSink {
        inner,
        delay: Duration::from_millis(20),
    });
    let (running, handle) = spawn(&ring, sink);

    let start = Instant::now();
    for i in 0..200u64 {
        ring.write_block(&[vec![i as f32; 100]], 100, i);
    }
    // 200 cycles against a 20 ms sink would take seconds if the producer waited.
    assert!(start.elapsed() < Duration::from_millis(500));

    wait_drained(&ring);
    let got = collect_until_idle(&rx);
    running.store(false, Ordering::SeqCst);
    handle.join().expect("transfer thread panicked");

    let seqs: Vec<u64> = got.iter().map(|b| b.sequence).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "out of order: {seqs:?}");
    assert!(
        got.iter().all(|b| b.planes[0][0] == b.sequence as f32),
        "stale slot delivered"
    );

    // After the stall only the newest lap is left; a busy slot costs at
    // most one index per switch of the consumer.
    let tail = seqs.iter().filter(|&&s| s >= 190).count();
    assert!(tail >= 8, "newest blocks missing: {seqs:?}");
    assert!(seqs.last().is_some_and(|&s| s >= 198), "{seqs:?}");

    let snap = ring.diagnostics().snapshot();
    assert_eq!(snap.blocks_written + snap.writes_rejected, 200);
    assert_eq!(snap.blocks_delivered + snap.blocks_dropped, 200);
    assert_eq!(snap.blocks_delivered, got.len() as u64);
}

/// Holds the first block until the test opens the gate.
struct GatedSink {
    inner: ChannelSink,
    entered: crossbeam_channel::Sender<()>,
    release: crossbeam_channel::Receiver<()>,
    gated: bool,
}

impl BlockSink for GatedSink {
    fn output(&mut self, block: &AudioBlock<'_>) -> Result<()> {
        if self.gated {
            self.gated = false;
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }
        self.inner.output(block)
    }
}

#[test]
fn stalled_sink_gets_the_newest_blocks_after_release() {
    let ring = Arc::new(BlockRing::new(10, 1));
    ring.create(1).unwrap();
    assert_eq!(ring.item_count(), 10);
    ring.write_block(&[vec![0.0f32]], 1, 0);

    let (inner, rx) = ChannelSink::unbounded();
    let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded(1);
    let sink = SinkHandle::new(GatedSink {
        inner,
        entered: entered_tx,
        release: release_rx,
        gated: true,
    });
    let (running, handle) = spawn(&ring, sink);
    entered_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("sink never received block 0");

    // Block 0's slot stays busy for the whole burst.
    let statuses: Vec<CycleStatus> = (1..30u64)
        .map(|i| ring.write_block(&[vec![i as f32]], 1, i))
        .collect();
    for (i, status) in (1..30u64).zip(&statuses) {
        let expected = if i % 10 == 0 {
            CycleStatus::Rejected
        } else {
            CycleStatus::Written
        };
        assert_eq!(*status, expected, "cycle {i}");
    }

    release_tx.send(()).unwrap();
    wait_drained(&ring);
    let got = collect_until_idle(&rx);
    running.store(false, Ordering::SeqCst);
    handle.join().expect("transfer thread panicked");

    let seqs: Vec<u64> = got.iter().map(|b| b.sequence).collect();
    let mut expected = vec![0];
    expected.extend(21..30);
    assert_eq!(seqs, expected);
    assert!(got.iter().all(|b| b.planes[0][0] == b.sequence as f32));

    let snap = ring.diagnostics().snapshot();
    assert_eq!(snap.blocks_delivered, 10);
    assert_eq!(snap.blocks_dropped, 20);
    assert_eq!(snap.writes_rejected, 2);
}
