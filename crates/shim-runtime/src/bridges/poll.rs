//! `poll`: race a set of pollables and re-enter the guest.
//!
//! The guest passes a pointer to `count` little-endian `u32` pollable ids and
//! an output pointer. The host call suspends (only this call, the tokio
//! runtime keeps driving timers) until the first pollable settles, writes
//! `{ready: 1, index: id}` at the output pointer and then calls the guest's
//! resumption export. The guest relies on that ordering: the result is in
//! memory before its resumption logic runs.
//!
//! Simultaneous completions are resolved by ascending pollable id. A pollable
//! that settled as `Failed` wins a race exactly like a `Ready` one; the guest
//! cannot tell them apart.

use crate::host::HostState;
use crate::memory::{GuestView, GuestViewMut, exported_memory};
use crate::pollable::{PollableRegistry, PollableState};
use futures::future::select_all;
use shim_core::{Error, PollableId, Result};
use std::future::Future;
use wasmtime::{Caller, Extern, Linker};

/// Import namespace of `poll`.
pub const NAMESPACE: &str = "wasi:io/poll@0.2.1";

/// Winner of a poll race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Id of the first pollable to settle
    pub id: PollableId,
    /// State it settled in
    pub state: PollableState,
}

/// Builds the race over `ids`.
///
/// Every id is resolved up front, so an unknown id fails before anything is
/// awaited. The returned future does not borrow the registry.
///
/// # Errors
///
/// Returns [`Error::EmptyPollSet`] for an empty set and
/// [`Error::UnknownPollable`] for an id that was never issued.
pub fn race(
    registry: &PollableRegistry,
    ids: &[PollableId],
) -> Result<impl Future<Output = PollOutcome> + Send + use<>> {
    if ids.is_empty() {
        return Err(Error::EmptyPollSet);
    }

    let mut ordered = ids.to_vec();
    ordered.sort_unstable();
    ordered.dedup();

    let waits = ordered
        .into_iter()
        .map(|id| -> Result<_> {
            let ready = registry.lookup(id)?.ready();
            Ok(Box::pin(async move {
                PollOutcome {
                    id,
                    state: ready.await,
                }
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    // select_all scans in vector order on every wakeup, so with the ids
    // sorted the lowest settled id wins a tie.
    Ok(async move {
        let (outcome, _, _) = select_all(waits).await;
        outcome
    })
}

/// Handles a `poll` call from the guest.
///
/// # Errors
///
/// Fails on protocol violations (empty set, unknown id, out-of-bounds
/// pointers), on a missing memory or resumption export, and with whatever
/// trap the resumption export raises.
pub async fn poll(
    caller: &mut Caller<'_, HostState>,
    ids_ptr: u32,
    count: u32,
    out_ptr: u32,
) -> wasmtime::Result<PollOutcome> {
    let memory_name = caller.data().exports.memory.clone();
    let memory = exported_memory(caller, &memory_name)?;

    let ids = GuestView::new(memory.data(&*caller)).read_pollable_ids(ids_ptr, count)?;
    tracing::debug!("poll({} pollables: {:?})", ids.len(), ids);

    let outcome = race(&caller.data().registry, &ids)?.await;
    if outcome.state == PollableState::Failed {
        tracing::warn!("Pollable {} failed but is reported as ready", outcome.id);
        caller.data_mut().stats.failed_winners += 1;
    }

    GuestViewMut::new(memory.data_mut(&mut *caller)).write_poll_result(out_ptr, true, outcome.id)?;
    caller.data_mut().stats.polls += 1;
    tracing::debug!("poll settled on pollable {}", outcome.id);

    resume(caller).await?;
    Ok(outcome)
}

/// Calls the guest's resumption export.
async fn resume(caller: &mut Caller<'_, HostState>) -> wasmtime::Result<()> {
    let name = caller.data().exports.resume.clone();
    let func = caller
        .get_export(&name)
        .and_then(Extern::into_func)
        .ok_or_else(|| Error::MissingExport { name: name.clone() })?;
    let func = func
        .typed::<(), ()>(&*caller)
        .map_err(|_| Error::MissingExport { name: name.clone() })?;

    tracing::trace!("Resuming guest through '{}'", name);
    caller.data_mut().stats.resumes += 1;
    func.call_async(&mut *caller, ()).await
}

pub(crate) fn link(linker: &mut Linker<HostState>) -> Result<()> {
    linker
        .func_wrap_async(
            NAMESPACE,
            "poll",
            |mut caller: Caller<'_, HostState>, (ids_ptr, count, out_ptr): (i32, i32, i32)| {
                Box::new(async move {
                    poll(
                        &mut caller,
                        ids_ptr.cast_unsigned(),
                        count.cast_unsigned(),
                        out_ptr.cast_unsigned(),
                    )
                    .await?;
                    Ok(())
                })
            },
        )
        .map_err(|e| Error::WasmError {
            message: format!("Failed to link poll: {e}"),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pollable::Pollable;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_set_is_rejected() {
        let registry = PollableRegistry::new();
        let err = race(&registry, &[]).err().unwrap();
        assert!(matches!(err, Error::EmptyPollSet));
    }

    #[tokio::test]
    async fn test_unknown_id_is_rejected() {
        let mut registry = PollableRegistry::new();
        registry.subscribe_timer(Duration::ZERO).unwrap();

        let err = race(&registry, &[PollableId::new(0), PollableId::new(4)])
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownPollable { id } if id.as_u32() == 4));
    }

    #[tokio::test]
    async fn test_zero_delay_wins_over_long_timers() {
        let mut registry = PollableRegistry::new();
        let slow_a = registry.subscribe_timer(Duration::from_secs(30)).unwrap();
        let fast = registry.subscribe_timer(Duration::ZERO).unwrap();
        let slow_b = registry.subscribe_timer(Duration::from_secs(60)).unwrap();

        let outcome = race(&registry, &[slow_a, fast, slow_b]).unwrap().await;
        assert_eq!(outcome.id, fast);
        assert_eq!(outcome.state, PollableState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_earliest_deadline_wins() {
        let mut registry = PollableRegistry::new();
        let later = registry.subscribe_timer(Duration::from_millis(40)).unwrap();
        let sooner = registry.subscribe_timer(Duration::from_millis(10)).unwrap();

        let outcome = race(&registry, &[later, sooner]).unwrap().await;
        assert_eq!(outcome.id, sooner);
    }

    #[tokio::test]
    async fn test_ties_break_by_ascending_id() {
        let mut registry = PollableRegistry::new();
        for _ in 0..4 {
            registry.subscribe_timer(Duration::ZERO).unwrap();
        }
        // Let every timer settle before racing.
        for pollable in registry.iter() {
            pollable.ready().await;
        }

        let ids = [
            PollableId::new(3),
            PollableId::new(1),
            PollableId::new(2),
        ];
        let outcome = race(&registry, &ids).unwrap().await;
        assert_eq!(outcome.id, PollableId::new(1));
    }

    #[tokio::test]
    async fn test_failed_pollable_can_win() {
        let mut registry = PollableRegistry::new();
        let slow = registry.subscribe_timer(Duration::from_secs(30)).unwrap();
        let broken = registry
            .push_with(|id| Pollable::spawn(id, async { Err::<(), _>("timer source lost") }))
            .unwrap();

        let outcome = race(&registry, &[slow, broken]).unwrap().await;
        assert_eq!(outcome.id, broken);
        assert_eq!(outcome.state, PollableState::Failed);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_raced_once() {
        let mut registry = PollableRegistry::new();
        let id = registry.subscribe_timer(Duration::ZERO).unwrap();

        let outcome = race(&registry, &[id, id, id]).unwrap().await;
        assert_eq!(outcome.id, id);
    }
}
