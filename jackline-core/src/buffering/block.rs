//! Blocks handed to the downstream sink.

use serde::{Deserialize, Serialize};

use crate::layout::SpeakerLayout;

/// Sample format of every block. The audio server always delivers
/// 32-bit float, one buffer per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    F32Planar,
}

/// One drained block, borrowing the ring slot it came from.
///
/// The channel buffers are only valid for the duration of the
/// [`BlockSink::output`](crate::sink::BlockSink::output) call. Use
/// [`to_owned_block`](Self::to_owned_block) to keep the audio.
#[derive(Debug, Clone, Copy)]
pub struct AudioBlock<'a> {
    pub layout: SpeakerLayout,
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub frames: usize,
    /// Capture time in downstream clock units (ns).
    pub timestamp: u64,
    /// Logical production index within the current ring generation.
    pub sequence: u64,
    planes: &'a [Vec<f32>],
}

impl<'a> AudioBlock<'a> {
    pub(crate) fn new(
        layout: SpeakerLayout,
        sample_rate: u32,
        frames: usize,
        timestamp: u64,
        sequence: u64,
        planes: &'a [Vec<f32>],
    ) -> Self {
        Self {
            layout,
            sample_rate,
            format: SampleFormat::F32Planar,
            frames,
            timestamp,
            sequence,
            planes,
        }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Samples of channel `index`, exactly `frames` long.
    pub fn channel(&self, index: usize) -> Option<&'a [f32]> {
        self.planes.get(index).map(|p| &p[..self.frames])
    }

    pub fn iter_channels(&self) -> impl Iterator<Item = &'a [f32]> + '_ {
        let frames = self.frames;
        let planes: &'a [Vec<f32>] = self.planes;
        planes.iter().map(move |p| &p[..frames])
    }

    /// Copy the block out of the ring.
    pub fn to_owned_block(&self) -> OwnedBlock {
        OwnedBlock {
            layout: self.layout,
            sample_rate: self.sample_rate,
            frames: self.frames,
            timestamp: self.timestamp,
            sequence: self.sequence,
            planes: self.iter_channels().map(<[f32]>::to_vec).collect(),
        }
    }
}

/// Heap copy of an [`AudioBlock`]. Allocated on the transfer thread only.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedBlock {
    pub layout: SpeakerLayout,
    pub sample_rate: u32,
    pub frames: usize,
    pub timestamp: u64,
    pub sequence: u64,
    pub planes: Vec<Vec<f32>>,
}

impl OwnedBlock {
    /// Returns the duration of this block in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }

    /// Frame-major copy of the samples (`L R L R …`).
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames * self.planes.len());
        for f in 0..self.frames {
            for plane in &self.planes {
                out.push(plane[f]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_views_are_trimmed_to_frames() {
        let planes = vec![vec![1.0, 2.0, 3.0, 0.0], vec![4.0, 5.0, 6.0, 0.0]];
        let block = AudioBlock::new(SpeakerLayout::Stereo, 48_000, 3, 1_000, 9, &planes);

        assert_eq!(block.channels(), 2);
        assert_eq!(block.channel(0), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(block.channel(2), None);
        assert_eq!(block.format, SampleFormat::F32Planar);

        let owned = block.to_owned_block();
        assert_eq!(owned.planes, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(owned.interleaved(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(owned.sequence, 9);
    }

    #[test]
    fn duration_uses_sample_rate() {
        let planes = vec![vec![0.0; 480]];
        let owned = AudioBlock::new(SpeakerLayout::Mono, 48_000, 480, 0, 0, &planes)
            .to_owned_block();
        approx::assert_relative_eq!(owned.duration_secs(), 0.01);
    }
}
