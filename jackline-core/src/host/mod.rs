//! Audio server client abstraction.
//!
//! The `AudioHost` trait is the seam between the engine and whatever drives
//! the real-time callbacks: a JACK-style audio server client, cpal, or the
//! in-process [`ManualHost`] used by tests and the soak binary.
//!
//! # Host contract
//!
//! Once a [`CycleHandler`] is installed and the host is activated, the host
//! calls `process` once per cycle from its real-time thread and
//! `block_size_changed` whenever the block size is renegotiated. The host
//! **must never run those two concurrently.** The ring relies on that for its
//! lock-free producer path.

pub mod manual;

#[cfg(feature = "audio-cpal")]
pub mod cpal;

pub use manual::ManualHost;

#[cfg(feature = "audio-cpal")]
pub use self::cpal::CpalHost;

use serde::{Deserialize, Serialize};

use crate::config::BridgeConfig;
use crate::engine::CycleHandler;
use crate::error::HostError;

/// What the host reports once a client is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub sample_rate: u32,
    /// Current block size in frames.
    pub block_frames: u32,
}

/// Client lifecycle the engine drives, in call order.
///
/// Not `Send`: some drivers must be used on the thread that created them.
pub trait AudioHost {
    /// Connect to the audio server (optionally starting it).
    fn open(&mut self, config: &BridgeConfig) -> Result<HostInfo, HostError>;

    /// Register one input port.
    fn register_input(&mut self, port_name: &str) -> Result<(), HostError>;

    /// Install the process and block-size callbacks.
    fn install_handler(&mut self, handler: CycleHandler) -> Result<(), HostError>;

    /// Start calling the handler.
    fn activate(&mut self) -> Result<(), HostError>;

    /// Stop calling the handler. After this returns no callback is running.
    fn deactivate(&mut self) -> Result<(), HostError>;

    /// Drop every registered port.
    fn unregister_inputs(&mut self);

    /// Disconnect and release the installed handler.
    fn close(&mut self);
}
