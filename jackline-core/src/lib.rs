//! # jackline-core
//!
//! Real-time-safe hand-off of audio blocks from an audio server's process
//! callback to a downstream media sink.
//!
//! ## Architecture
//!
//! ```text
//! audio server ──process()──► CycleHandler ──► BlockRing[~1 s of blocks]
//!      │                                            │
//!      └─block_size_changed()─► resize (exclusive)  │  transfer thread
//!                                                   ▼
//!                                   AudioBlock ──► BlockSink::output
//! ```
//!
//! The process callback is zero-alloc and never waits. When the transfer
//! thread falls behind, the oldest blocks are overwritten and counted.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod ipc;
pub mod layout;
pub mod sink;
pub mod timebase;

// Convenience re-exports for downstream crates
pub use buffering::{AudioBlock, CycleStatus, DiagnosticsSnapshot, OwnedBlock, SampleFormat};
pub use config::BridgeConfig;
pub use engine::{CycleHandler, JacklineEngine};
pub use error::{HostError, JacklineError, SetupStage};
pub use host::{AudioHost, HostInfo, ManualHost};
pub use ipc::events::{SessionStatus, SessionStatusEvent};
pub use layout::SpeakerLayout;
pub use sink::{BlockSink, ChannelSink, SinkHandle, WavSink};

#[cfg(feature = "audio-cpal")]
pub use host::CpalHost;
