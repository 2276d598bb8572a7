//! `subscribe-duration`: timer-backed pollables.
//!
//! The timer primitive is millisecond-granular. Durations are truncated to
//! whole milliseconds, so anything below 1ms fires on the next timer tick.

use crate::host::HostState;
use crate::pollable::PollableRegistry;
use shim_core::{Error, PollableId, Result};
use std::time::Duration;
use wasmtime::{Caller, Linker};

/// Import namespace of the monotonic clock.
pub const NAMESPACE: &str = "wasi:clocks/monotonic-clock@0.2.1";

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Converts a guest duration in nanoseconds to the timer delay.
///
/// # Examples
///
/// ```
/// use shim_runtime::bridges::clock::delay_for;
/// use std::time::Duration;
///
/// assert_eq!(delay_for(2_000_000), Duration::from_millis(2));
/// assert_eq!(delay_for(2_999_999), Duration::from_millis(2));
/// assert_eq!(delay_for(-5), Duration::ZERO);
/// ```
#[must_use]
pub fn delay_for(nanos: i64) -> Duration {
    Duration::from_millis(u64::try_from(nanos / NANOS_PER_MILLI).unwrap_or(0))
}

/// Subscribes a timer that settles after `nanos` and returns its id.
///
/// # Errors
///
/// Returns [`Error::IdSpaceExhausted`] if no id is left.
pub fn subscribe_duration(registry: &mut PollableRegistry, nanos: i64) -> Result<PollableId> {
    let delay = delay_for(nanos);
    let id = registry.subscribe_timer(delay)?;
    tracing::debug!("subscribe-duration({}ns) -> pollable {} ({:?})", nanos, id, delay);
    Ok(id)
}

pub(crate) fn link(linker: &mut Linker<HostState>) -> Result<()> {
    linker
        .func_wrap(
            NAMESPACE,
            "subscribe-duration",
            |mut caller: Caller<'_, HostState>, nanos: i64| -> wasmtime::Result<i32> {
                let id = subscribe_duration(&mut caller.data_mut().registry, nanos)?;
                Ok(id.to_guest())
            },
        )
        .map_err(|e| Error::WasmError {
            message: format!("Failed to link subscribe-duration: {e}"),
        })?;
    Ok(())
}
