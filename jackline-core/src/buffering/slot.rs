//! Block Store: the pre-allocated slots backing the ring.
//!
//! Every slot owns one planar f32 buffer per channel, sized to the current
//! block capacity. Nothing here allocates after [`BlockStore::create`]
//! returns, so writing a slot is safe from the real-time callback.

use parking_lot::Mutex;

use crate::error::{JacklineError, Result};

/// One element of the ring: a block of planar audio plus its metadata.
#[derive(Debug)]
pub struct BlockSlot {
    planes: Vec<Vec<f32>>,
    frame_capacity: usize,
    frames: usize,
    host_time: u64,
    /// Logical write index this slot was last filled for.
    sequence: Option<u64>,
    /// Store generation this slot was last filled under.
    generation: u64,
}

impl BlockSlot {
    fn try_new(channels: usize, frame_capacity: usize) -> Option<Self> {
        let mut planes = Vec::new();
        planes.try_reserve_exact(channels).ok()?;
        for _ in 0..channels {
            planes.push(zeroed(frame_capacity)?);
        }
        Some(Self {
            planes,
            frame_capacity,
            frames: 0,
            host_time: 0,
            sequence: None,
            generation: 0,
        })
    }

    /// Copy one cycle's worth of channel buffers into this slot.
    ///
    /// Copies at most `frame_capacity` frames. Channels missing from
    /// `sources`, and the tail of a short source buffer, are zero-filled.
    /// Returns the number of frames stored. Bounded time, no allocation.
    pub fn write<S: AsRef<[f32]>>(
        &mut self,
        sources: &[S],
        frames: usize,
        host_time: u64,
        sequence: u64,
        generation: u64,
    ) -> usize {
        let frames = frames.min(self.frame_capacity);
        for (c, plane) in self.planes.iter_mut().enumerate() {
            match sources.get(c) {
                Some(src) => {
                    let src = src.as_ref();
                    let n = frames.min(src.len());
                    plane[..n].copy_from_slice(&src[..n]);
                    plane[n..frames].fill(0.0);
                }
                None => plane[..frames].fill(0.0),
            }
        }
        self.frames = frames;
        self.host_time = host_time;
        self.sequence = Some(sequence);
        self.generation = generation;
        frames
    }

    /// Full-capacity channel buffers. Only the first [`frames`](Self::frames)
    /// samples of each hold data from the last write.
    pub fn planes(&self) -> &[Vec<f32>] {
        &self.planes
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn host_time(&self) -> u64 {
        self.host_time
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this slot holds the block written for `sequence` under `generation`.
    pub fn holds(&self, sequence: u64, generation: u64) -> bool {
        self.sequence == Some(sequence) && self.generation == generation
    }
}

/// Fixed pool of slots. Channel count and frame capacity are uniform.
#[derive(Debug)]
pub struct BlockStore {
    slots: Vec<Mutex<BlockSlot>>,
    channels: usize,
    frame_capacity: usize,
    generation: u64,
}

impl BlockStore {
    /// Allocate `item_count` zeroed slots of `channels` × `frame_capacity`.
    ///
    /// # Errors
    /// `JacklineError::ResourceExhausted` if any allocation fails. Nothing
    /// is leaked: partially built slots are dropped on the way out.
    pub fn create(
        item_count: usize,
        channels: usize,
        frame_capacity: usize,
        generation: u64,
    ) -> Result<Self> {
        let exhausted = || JacklineError::ResourceExhausted {
            items: item_count,
            channels,
            frames: frame_capacity,
        };

        let mut slots = Vec::new();
        slots.try_reserve_exact(item_count).map_err(|_| exhausted())?;
        for _ in 0..item_count {
            let slot = BlockSlot::try_new(channels, frame_capacity).ok_or_else(exhausted)?;
            slots.push(Mutex::new(slot));
        }

        Ok(Self {
            slots,
            channels,
            frame_capacity,
            generation,
        })
    }

    /// A store with no slots. Used before creation and after destruction.
    pub fn empty(channels: usize, generation: u64) -> Self {
        Self {
            slots: Vec::new(),
            channels,
            frame_capacity: 0,
            generation,
        }
    }

    /// Release all slot memory.
    pub fn destroy(&mut self) {
        self.slots = Vec::new();
        self.frame_capacity = 0;
    }

    pub fn item_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Slot the producer fills for logical index `write_index`.
    pub fn slot_for_write(&self, write_index: u64) -> Option<&Mutex<BlockSlot>> {
        self.slot_index(write_index).map(|i| &self.slots[i])
    }

    /// Slot the consumer drains for logical index `read_index`.
    pub fn slot_for_read(&self, read_index: u64) -> Option<&Mutex<BlockSlot>> {
        self.slot_index(read_index).map(|i| &self.slots[i])
    }

    fn slot_index(&self, logical: u64) -> Option<usize> {
        let n = self.slots.len() as u64;
        if n == 0 {
            return None;
        }
        Some((logical % n) as usize)
    }
}

/// Number of blocks that hold roughly one second of audio. Never below one.
pub fn item_count_for(sample_rate: u32, block_frames: u32) -> usize {
    if block_frames == 0 {
        return 1;
    }
    ((sample_rate / block_frames) as usize).max(1)
}

fn zeroed(len: usize) -> Option<Vec<f32>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    v.resize(len, 0.0);
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_allocates_uniform_zeroed_slots() {
        let store = BlockStore::create(4, 2, 64, 1).unwrap();
        assert_eq!(store.item_count(), 4);
        assert_eq!(store.channels(), 2);
        assert_eq!(store.frame_capacity(), 64);
        for i in 0..4 {
            let slot = store.slot_for_read(i).unwrap().lock();
            assert_eq!(slot.planes().len(), 2);
            assert!(slot.planes().iter().all(|p| p.len() == 64));
            assert!(slot.planes().iter().flatten().all(|s| *s == 0.0));
            assert_eq!(slot.sequence(), None);
        }
    }

    #[test]
    fn slot_selection_wraps_modulo_item_count() {
        let store = BlockStore::create(3, 1, 8, 1).unwrap();
        let a = store.slot_for_write(1).unwrap() as *const _;
        let b = store.slot_for_read(4).unwrap() as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn empty_store_has_no_slots() {
        let mut store = BlockStore::create(3, 1, 8, 1).unwrap();
        store.destroy();
        assert!(store.is_empty());
        assert!(store.slot_for_write(0).is_none());
        assert!(BlockStore::empty(2, 0).slot_for_read(7).is_none());
    }

    #[test]
    fn write_truncates_and_zero_fills() {
        let mut slot = BlockSlot::try_new(3, 4).unwrap();
        let left = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let right = [9.0f32, 9.0];
        let stored = slot.write(&[&left[..], &right[..]], 6, 77, 5, 2);

        assert_eq!(stored, 4);
        assert_eq!(slot.frames(), 4);
        assert_eq!(slot.planes()[0], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(slot.planes()[1], vec![9.0, 9.0, 0.0, 0.0]);
        assert_eq!(slot.planes()[2], vec![0.0; 4]);
        assert_eq!(slot.host_time(), 77);
        assert!(slot.holds(5, 2));
        assert!(!slot.holds(5, 3));
        assert!(!slot.holds(6, 2));
    }

    #[test]
    fn item_count_is_about_one_second() {
        assert_eq!(item_count_for(48_000, 480), 100);
        assert_eq!(item_count_for(44_100, 1024), 43);
        assert_eq!(item_count_for(48_000, 96_000), 1);
        assert_eq!(item_count_for(48_000, 0), 1);
    }

    #[test]
    fn huge_store_reports_exhaustion() {
        let err = BlockStore::create(usize::MAX / 2, 2, 1024, 1).unwrap_err();
        assert!(matches!(err, JacklineError::ResourceExhausted { .. }));
    }
}
