//! Serialisable types for forwarding session state to a UI or control plane.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize`.

pub mod events;
