//! Session status events.
//!
//! Published on a `tokio::sync::broadcast` channel by the engine; subscribe
//! with [`JacklineEngine::subscribe_status`](crate::JacklineEngine::subscribe_status).

use serde::{Deserialize, Serialize};

pub use crate::buffering::DiagnosticsSnapshot;

/// Emitted whenever the session changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: SessionStatus,
    /// Optional human-readable detail (e.g. error message, new block size).
    pub detail: Option<String>,
}

/// Current state of a bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Engine created, `initialize()` not called yet.
    Idle,
    /// `initialize()` in progress.
    Starting,
    /// Host active, transfer loop draining.
    Running,
    /// Block size changed; queued audio was discarded.
    Resized,
    /// `shutdown()` completed.
    Stopped,
    /// Setup or reconfiguration failed. `shutdown()` is still safe.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = SessionStatusEvent {
            status: SessionStatus::Resized,
            detail: Some("block size 256 -> 512".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "resized");
        assert_eq!(json["detail"], "block size 256 -> 512");

        let round_trip: SessionStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, SessionStatus::Resized);
    }

    #[test]
    fn diagnostics_snapshot_uses_camel_case() {
        let snap = DiagnosticsSnapshot {
            blocks_dropped: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(snap).expect("serialize snapshot");
        assert_eq!(json["blocksDropped"], 3);
        assert_eq!(json["writesRejected"], 0);
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        assert!(serde_json::from_str::<SessionStatus>(r#""Running""#).is_err());
    }
}
