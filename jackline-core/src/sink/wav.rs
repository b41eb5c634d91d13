//! Sink that records drained blocks to a 32-bit float WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{WavSpec, WavWriter};
use tracing::{debug, info};

use crate::buffering::AudioBlock;
use crate::error::{JacklineError, Result};
use crate::sink::BlockSink;

/// Writes interleaved f32 samples via `hound`.
///
/// The file is created on the first block, so the WAV header carries the
/// session's real sample rate and channel count. A block with a different
/// format afterwards is rejected.
pub struct WavSink {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    spec: Option<WavSpec>,
    frames_written: u64,
}

impl WavSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            spec: None,
            frames_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn writer_for(&mut self, block: &AudioBlock<'_>) -> Result<&mut WavWriter<BufWriter<File>>> {
        let spec = WavSpec {
            channels: block.channels() as u16,
            sample_rate: block.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        match self.spec {
            Some(current) if current != spec => {
                return Err(JacklineError::Sink(format!(
                    "format changed mid-recording: {}ch@{}Hz -> {}ch@{}Hz",
                    current.channels, current.sample_rate, spec.channels, spec.sample_rate
                )));
            }
            Some(_) => {}
            None => {
                let writer = WavWriter::create(&self.path, spec).map_err(sink_err)?;
                info!(path = %self.path.display(), channels = spec.channels, sample_rate = spec.sample_rate, "wav sink opened");
                self.writer = Some(writer);
                self.spec = Some(spec);
            }
        }

        self.writer
            .as_mut()
            .ok_or_else(|| JacklineError::Sink("wav writer already finalized".into()))
    }
}

impl BlockSink for WavSink {
    fn output(&mut self, block: &AudioBlock<'_>) -> Result<()> {
        let frames = block.frames;
        let writer = self.writer_for(block)?;
        for f in 0..frames {
            for channel in block.iter_channels() {
                writer.write_sample(channel[f]).map_err(sink_err)?;
            }
        }
        self.frames_written += frames as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(sink_err)?;
            debug!(frames = self.frames_written, "wav sink finalized");
        }
        Ok(())
    }
}

fn sink_err(e: hound::Error) -> JacklineError {
    JacklineError::Sink(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SpeakerLayout;

    #[test]
    fn writes_interleaved_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut sink = WavSink::new(&path);

        let planes = vec![vec![0.5f32, 0.25], vec![-0.5f32, -0.25]];
        let block = AudioBlock::new(SpeakerLayout::Stereo, 48_000, 2, 0, 0, &planes);
        sink.output(&block).unwrap();
        sink.output(&block).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.frames_written(), 4);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.5, -0.5, 0.25, -0.25, 0.5, -0.5, 0.25, -0.25]);
    }

    #[test]
    fn rejects_format_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = WavSink::new(dir.path().join("out.wav"));

        let stereo = vec![vec![0.0f32; 4], vec![0.0f32; 4]];
        let mono = vec![vec![0.0f32; 4]];
        sink.output(&AudioBlock::new(SpeakerLayout::Stereo, 48_000, 4, 0, 0, &stereo))
            .unwrap();
        let err = sink
            .output(&AudioBlock::new(SpeakerLayout::Mono, 48_000, 4, 0, 1, &mono))
            .unwrap_err();
        assert!(err.to_string().contains("format changed"));
    }
}
