//! Speaker layout inferred from the number of registered input ports.
//!
//! The audio server only tells us how many ports we have, not what they are,
//! so the layout is a best guess. It works for the common setups; anything
//! unusual (including 7 channels) is reported as `Unknown`.

use serde::{Deserialize, Serialize};

/// Channel arrangement tag handed to the downstream sink with every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerLayout {
    Unknown,
    Mono,
    Stereo,
    /// 2.1
    TwoPointOne,
    /// Quad (4.0)
    FourPointZero,
    /// 4.1
    FourPointOne,
    /// 5.1
    FivePointOne,
    /// 7.1
    SevenPointOne,
}

impl SpeakerLayout {
    /// Map a channel count to a layout. Total: every count has an answer.
    pub fn from_channel_count(channels: usize) -> Self {
        match channels {
            1 => SpeakerLayout::Mono,
            2 => SpeakerLayout::Stereo,
            3 => SpeakerLayout::TwoPointOne,
            4 => SpeakerLayout::FourPointZero,
            5 => SpeakerLayout::FourPointOne,
            6 => SpeakerLayout::FivePointOne,
            8 => SpeakerLayout::SevenPointOne,
            _ => SpeakerLayout::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != SpeakerLayout::Unknown
    }
}
