fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jackline=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("soak failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use jackline_core::{
        AudioBlock, BlockSink, BridgeConfig, CycleStatus, DiagnosticsSnapshot, JacklineEngine,
        ManualHost, SinkHandle, WavSink,
    };
    use serde::Serialize;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Debug)]
    struct Args {
        cycles: u64,
        sample_rate: u32,
        block: u32,
        channels: u16,
        resize_at: Option<(u64, u32)>,
        pace: bool,
        wav: Option<PathBuf>,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Summary {
        cycles: u64,
        sample_rate: u32,
        initial_block: u32,
        final_block: u32,
        channels: u16,
        paced: bool,
        cycles_stored: u64,
        cycles_rejected: u64,
        cycles_without_storage: u64,
        frames_discarded: u64,
        p50_cycle_us: f64,
        p99_cycle_us: f64,
        max_cycle_us: f64,
        elapsed_ms: f64,
        diagnostics: DiagnosticsSnapshot,
    }

    fn parse_args() -> Result<Args, String> {
        let mut args = Args {
            cycles: 1_000,
            sample_rate: 48_000,
            block: 480,
            channels: 2,
            resize_at: None,
            pace: false,
            wav: None,
            output: None,
        };

        fn value<T: std::str::FromStr>(
            it: &mut impl Iterator<Item = String>,
            flag: &str,
        ) -> Result<T, String> {
            let Some(v) = it.next() else {
                return Err(format!("missing value for {flag}"));
            };
            v.parse::<T>()
                .map_err(|_| format!("invalid value for {flag}: {v}"))
        }

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--cycles" => args.cycles = value(&mut it, "--cycles")?,
                "--sample-rate" => args.sample_rate = value(&mut it, "--sample-rate")?,
                "--block" => args.block = value(&mut it, "--block")?,
                "--channels" => args.channels = value(&mut it, "--channels")?,
                "--resize-at" => {
                    // <cycle>:<frames>
                    let raw: String = value(&mut it, "--resize-at")?;
                    let (cycle, frames) = raw
                        .split_once(':')
                        .ok_or_else(|| "expected --resize-at <cycle>:<frames>".to_string())?;
                    let cycle = cycle
                        .parse::<u64>()
                        .map_err(|_| format!("invalid cycle in --resize-at: {cycle}"))?;
                    let frames = frames
                        .parse::<u32>()
                        .map_err(|_| format!("invalid frames in --resize-at: {frames}"))?;
                    args.resize_at = Some((cycle, frames));
                }
                "--pace" => args.pace = true,
                "--wav" => args.wav = Some(PathBuf::from(value::<String>(&mut it, "--wav")?)),
                "--output" => {
                    args.output = Some(PathBuf::from(value::<String>(&mut it, "--output")?))
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p jackline-core --bin soak -- \\
  [--cycles <n>] [--sample-rate <hz>] [--block <frames>] [--channels <n>] \\
  [--resize-at <cycle>:<frames>] [--pace] [--wav <file.wav>] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }

        if args.block == 0 || args.sample_rate == 0 {
            return Err("sample rate and block size must be non-zero".into());
        }
        Ok(args)
    }

    fn percentile(values: &[f64], p: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    /// Per-channel sine at 220 Hz × (channel + 1), continuous across cycles.
    fn fill_sine(planes: &mut [Vec<f32>], frames: usize, start_frame: u64, sample_rate: u32) {
        for (c, plane) in planes.iter_mut().enumerate() {
            plane.resize(frames, 0.0);
            let freq = 220.0 * (c as f64 + 1.0);
            for (i, sample) in plane.iter_mut().enumerate() {
                let t = (start_frame + i as u64) as f64 / sample_rate as f64;
                *sample = (0.25 * (std::f64::consts::TAU * freq * t).sin()) as f32;
            }
        }
    }

    let args = parse_args()?;

    /// Counts frames and throws the audio away.
    struct NullSink {
        frames: Arc<AtomicU64>,
    }

    impl BlockSink for NullSink {
        fn output(&mut self, block: &AudioBlock<'_>) -> jackline_core::error::Result<()> {
            self.frames.fetch_add(block.frames as u64, Ordering::Relaxed);
            Ok(())
        }
    }

    let sink_frames = Arc::new(AtomicU64::new(0));
    let sink = match &args.wav {
        Some(path) => SinkHandle::new(WavSink::new(path)),
        None => SinkHandle::new(NullSink {
            frames: Arc::clone(&sink_frames),
        }),
    };

    let host = ManualHost::new(args.sample_rate, args.block);
    let driver = host.clone();
    let mut engine = JacklineEngine::new(host, sink);
    let config = BridgeConfig {
        client_name: "jackline-soak".into(),
        channels: args.channels,
        idle_poll_ms: 1,
        ..Default::default()
    };
    engine.initialize(&config).map_err(|e| e.to_string())?;

    let mut planes = vec![Vec::new(); args.channels as usize];
    let mut cycle_us = Vec::with_capacity(args.cycles as usize);
    let (mut stored, mut rejected, mut no_storage) = (0u64, 0u64, 0u64);
    let mut frame_clock = 0u64;
    let started = Instant::now();

    for cycle in 0..args.cycles {
        if let Some((at, frames)) = args.resize_at {
            if cycle == at {
                if let Some(Err(e)) = driver.change_block_size(frames) {
                    return Err(format!("resize at cycle {cycle} failed: {e}"));
                }
            }
        }

        let frames = driver.info().block_frames as usize;
        fill_sine(&mut planes, frames, frame_clock, args.sample_rate);
        let host_time = frame_clock * 1_000_000 / args.sample_rate as u64;

        let t0 = Instant::now();
        let status = driver.run_cycle(&planes, host_time);
        cycle_us.push(t0.elapsed().as_secs_f64() * 1e6);

        match status {
            Some(CycleStatus::Written | CycleStatus::Truncated) => stored += 1,
            Some(CycleStatus::Rejected) => rejected += 1,
            Some(CycleStatus::NoStorage) | None => no_storage += 1,
        }
        frame_clock += frames as u64;

        if args.pace {
            std::thread::sleep(Duration::from_secs_f64(
                frames as f64 / args.sample_rate as f64,
            ));
        }
    }

    // Let the transfer loop catch up before tearing down.
    let deadline = Instant::now() + Duration::from_secs(2);
    while engine.ring().is_some_and(|r| !r.is_drained()) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    let diagnostics = engine.diagnostics_snapshot();
    let final_block = engine.block_frames();
    engine.shutdown();

    let summary = Summary {
        cycles: args.cycles,
        sample_rate: args.sample_rate,
        initial_block: args.block,
        final_block,
        channels: args.channels,
        paced: args.pace,
        cycles_stored: stored,
        cycles_rejected: rejected,
        cycles_without_storage: no_storage,
        frames_discarded: sink_frames.load(Ordering::Relaxed),
        p50_cycle_us: percentile(&cycle_us, 0.50),
        p99_cycle_us: percentile(&cycle_us, 0.99),
        max_cycle_us: cycle_us.iter().copied().fold(0.0, f64::max),
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        diagnostics,
    };

    println!(
        "Done. cycles={} delivered={} dropped={} p99={:.1}µs",
        summary.cycles,
        summary.diagnostics.blocks_delivered,
        summary.diagnostics.blocks_dropped,
        summary.p99_cycle_us
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote soak report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
