//! Host clock → downstream clock conversion.
//!
//! The audio server timestamps blocks in microseconds; the downstream media
//! pipeline expects nanoseconds.

/// Downstream clock ticks per host clock tick.
pub const DOWNSTREAM_TICKS_PER_HOST_TICK: u64 = 1_000;

/// Convert a host-clock timestamp (µs) to the downstream clock (ns).
///
/// Saturates instead of wrapping; a host clock that far out is already broken.
#[inline]
pub fn host_to_downstream(host_time: u64) -> u64 {
    host_time.saturating_mul(DOWNSTREAM_TICKS_PER_HOST_TICK)
}
