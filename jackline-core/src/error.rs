use std::fmt;

use thiserror::Error;

/// Setup step that was running when `initialize` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    ClientOpen,
    PortRegistration,
    CallbackRegistration,
    Activation,
    TransferThread,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStage::ClientOpen => "client open",
            SetupStage::PortRegistration => "port registration",
            SetupStage::CallbackRegistration => "callback registration",
            SetupStage::Activation => "activation",
            SetupStage::TransferThread => "transfer thread creation",
        };
        f.write_str(name)
    }
}

/// All errors produced by jackline-core.
#[derive(Debug, Error)]
pub enum JacklineError {
    #[error("setup failed during {stage}: {reason}")]
    Setup { stage: SetupStage, reason: String },

    #[error("could not allocate {items} blocks of {channels}×{frames} samples")]
    ResourceExhausted {
        items: usize,
        channels: usize,
        frames: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid block size: {0} frames")]
    InvalidBlockSize(u32),

    #[error("session failed and was torn down")]
    SessionFailed,

    #[error("sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JacklineError {
    pub fn setup(stage: SetupStage, reason: impl Into<String>) -> Self {
        Self::Setup {
            stage,
            reason: reason.into(),
        }
    }

    /// The setup stage, if this is a setup failure.
    pub fn stage(&self) -> Option<SetupStage> {
        match self {
            Self::Setup { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Failure reported by an [`AudioHost`](crate::host::AudioHost) driver.
///
/// Carries only a message; the engine knows which setup stage was running
/// and wraps it into [`JacklineError::Setup`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, JacklineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_error_names_the_stage() {
        let err = JacklineError::setup(SetupStage::PortRegistration, "in_3 already taken");
        assert_eq!(
            err.to_string(),
            "setup failed during port registration: in_3 already taken"
        );
        assert_eq!(err.stage(), Some(SetupStage::PortRegistration));
    }

    #[test]
    fn resource_exhausted_display() {
        let err = JacklineError::ResourceExhausted {
            items: 100,
            channels: 2,
            frames: 480,
        };
        assert!(err.to_string().contains("100 blocks"));
        assert_eq!(err.stage(), None);
    }
}
