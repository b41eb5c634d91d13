//! `ManualHost`: in-process driver where the caller runs each cycle.
//!
//! Used by the integration tests and the soak binary. Cycles and block-size
//! changes go through one mutex, which gives the same "never concurrently"
//! guarantee a real audio server provides.
//!
//! Can be told to fail at any setup step to exercise `initialize()` error
//! paths.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffering::CycleStatus;
use crate::config::BridgeConfig;
use crate::engine::CycleHandler;
use crate::error::{HostError, Result, SetupStage};
use crate::host::{AudioHost, HostInfo};

#[derive(Debug)]
struct ManualState {
    info: HostInfo,
    fail_at: Option<SetupStage>,
    open: bool,
    active: bool,
    ports: Vec<String>,
    handler: Option<CycleHandler>,
    /// Client names passed to `open`, for assertions.
    opened_as: Vec<String>,
    close_calls: usize,
}

/// Cloneable: keep one clone to drive cycles while the engine owns another.
#[derive(Debug, Clone)]
pub struct ManualHost {
    state: Arc<Mutex<ManualState>>,
}

impl ManualHost {
    pub fn new(sample_rate: u32, block_frames: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                info: HostInfo {
                    sample_rate,
                    block_frames,
                },
                fail_at: None,
                open: false,
                active: false,
                ports: Vec::new(),
                handler: None,
                opened_as: Vec::new(),
                close_calls: 0,
            })),
        }
    }

    /// Make the setup step `stage` fail.
    ///
    /// `TransferThread` is not a host step and has no effect here.
    pub fn failing_at(self, stage: SetupStage) -> Self {
        self.state.lock().fail_at = Some(stage);
        self
    }

    /// Run one processing cycle at the current block size.
    ///
    /// Returns `None` when the host is not active (no callbacks happen).
    pub fn run_cycle<S: AsRef<[f32]>>(&self, channels: &[S], host_time: u64) -> Option<CycleStatus> {
        let state = self.state.lock();
        if !state.active {
            return None;
        }
        let frames = state.info.block_frames;
        state
            .handler
            .as_ref()
            .map(|h| h.process(frames, channels, host_time))
    }

    /// Renegotiate the block size and notify the handler.
    ///
    /// Returns `None` if no handler is installed.
    pub fn change_block_size(&self, frames: u32) -> Option<Result<()>> {
        let mut state = self.state.lock();
        state.info.block_frames = frames;
        debug!(frames, "manual host block size changed");
        state.handler.as_ref().map(|h| h.block_size_changed(frames))
    }

    pub fn info(&self) -> HostInfo {
        self.state.lock().info
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn has_handler(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    pub fn ports(&self) -> Vec<String> {
        self.state.lock().ports.clone()
    }

    pub fn opened_as(&self) -> Vec<String> {
        self.state.lock().opened_as.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    fn check(state: &ManualState, stage: SetupStage) -> std::result::Result<(), HostError> {
        if state.fail_at == Some(stage) {
            return Err(HostError::new(format!("simulated {stage} failure")));
        }
        Ok(())
    }
}

impl AudioHost for ManualHost {
    fn open(&mut self, config: &BridgeConfig) -> std::result::Result<HostInfo, HostError> {
        let mut state = self.state.lock();
        Self::check(&state, SetupStage::ClientOpen)?;
        state.open = true;
        state.opened_as.push(config.client_name.clone());
        Ok(state.info)
    }

    fn register_input(&mut self, port_name: &str) -> std::result::Result<(), HostError> {
        let mut state = self.state.lock();
        Self::check(&state, SetupStage::PortRegistration)?;
        if state.ports.iter().any(|p| p == port_name) {
            return Err(HostError::new(format!("port {port_name} already registered")));
        }
        state.ports.push(port_name.to_string());
        Ok(())
    }

    fn install_handler(&mut self, handler: CycleHandler) -> std::result::Result<(), HostError> {
        let mut state = self.state.lock();
        Self::check(&state, SetupStage::CallbackRegistration)?;
        state.handler = Some(handler);
        Ok(())
    }

    fn activate(&mut self) -> std::result::Result<(), HostError> {
        let mut state = self.state.lock();
        Self::check(&state, SetupStage::Activation)?;
        state.active = true;
        Ok(())
    }

    fn deactivate(&mut self) -> std::result::Result<(), HostError> {
        self.state.lock().active = false;
        Ok(())
    }

    fn unregister_inputs(&mut self) {
        self.state.lock().ports.clear();
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.handler = None;
        state.open = false;
        state.close_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cycles_before_activation() {
        let host = ManualHost::new(48_000, 480);
        assert_eq!(host.run_cycle(&[vec![0.0f32; 480]], 0), None);
        assert!(host.change_block_size(256).is_none());
        assert_eq!(host.info().block_frames, 256);
    }

    #[test]
    fn duplicate_port_is_rejected() {
        let mut host = ManualHost::new(48_000, 480);
        host.register_input("in_1").unwrap();
        assert!(host.register_input("in_1").is_err());
        host.unregister_inputs();
        assert!(host.ports().is_empty());
    }

    #[test]
    fn simulated_failure_only_hits_its_stage() {
        let mut host = ManualHost::new(48_000, 480).failing_at(SetupStage::Activation);
        host.open(&BridgeConfig::default()).unwrap();
        host.register_input("in_1").unwrap();
        let err = host.activate().unwrap_err();
        assert!(err.to_string().contains("activation"));
        assert!(!host.is_active());
    }
}
