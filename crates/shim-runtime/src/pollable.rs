//! Pollables and the append-only registry that owns them.
//!
//! A [`Pollable`] is the host side of one outstanding asynchronous wait. Its
//! completion source runs as a spawned tokio task that publishes the terminal
//! state through a `watch` channel, so the pollable settles whether or not
//! anyone is awaiting it.
//!
//! The [`PollableRegistry`] is a slot arena: the id of a pollable is its
//! slot index, ids are handed out sequentially from 0 and slots are never
//! freed. There is no cancellation, so a run that keeps subscribing grows the
//! arena (and keeps its timer tasks alive) for the rest of the process.
//!
//! # Examples
//!
//! ```
//! use shim_runtime::pollable::{PollableRegistry, PollableState};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> shim_core::Result<()> {
//! let mut registry = PollableRegistry::new();
//! let id = registry.subscribe_timer(Duration::ZERO)?;
//!
//! let state = registry.lookup(id)?.ready().await;
//! assert_eq!(state, PollableState::Ready);
//! # Ok(())
//! # }
//! ```

use shim_core::{Error, PollableId, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle of a pollable.
///
/// `Pending` moves to exactly one of the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollableState {
    /// Completion source has not signalled yet
    Pending,
    /// Completion source finished successfully
    Ready,
    /// Completion source failed or went away without signalling
    Failed,
}

impl PollableState {
    /// Returns `true` for `Ready` and `Failed`.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Host-side handle for one outstanding asynchronous wait.
#[derive(Debug)]
pub struct Pollable {
    id: PollableId,
    signal: watch::Receiver<PollableState>,
}

impl Pollable {
    /// Creates a pollable that settles when `completion` finishes.
    ///
    /// `Ok(())` settles it as `Ready`, `Err(_)` as `Failed`. If the task is
    /// dropped before producing a value (runtime shutdown, panic) the
    /// pollable reads as `Failed`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, E>(id: PollableId, completion: F) -> Self
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let (tx, rx) = watch::channel(PollableState::Pending);
        tokio::spawn(async move {
            let state = match completion.await {
                Ok(()) => PollableState::Ready,
                Err(e) => {
                    tracing::warn!("Pollable {} failed: {}", id, e);
                    PollableState::Failed
                }
            };
            tracing::trace!("Pollable {} settled as {:?}", id, state);
            // Receivers live in the registry for the whole run; a send error
            // only means the store was already torn down.
            let _ = tx.send(state);
        });
        Self { id, signal: rx }
    }

    /// Creates a pollable backed by a tokio timer.
    pub fn timer(id: PollableId, delay: Duration) -> Self {
        Self::spawn(id, async move {
            tokio::time::sleep(delay).await;
            Ok::<(), std::convert::Infallible>(())
        })
    }

    /// Returns the id of this pollable.
    #[must_use]
    pub const fn id(&self) -> PollableId {
        self.id
    }

    /// Returns the current state without waiting.
    #[must_use]
    pub fn state(&self) -> PollableState {
        let current = *self.signal.borrow();
        if current == PollableState::Pending && self.signal.has_changed().is_err() {
            PollableState::Failed
        } else {
            current
        }
    }

    /// Returns a future that resolves once the pollable leaves `Pending`.
    ///
    /// The future owns its own receiver, so it does not borrow the registry
    /// and can be awaited after the registry is handed back to the store.
    pub fn ready(&self) -> impl Future<Output = PollableState> + Send + use<> {
        let mut signal = self.signal.clone();
        async move {
            match signal.wait_for(|state| state.is_settled()).await {
                Ok(state) => *state,
                Err(_) => PollableState::Failed,
            }
        }
    }
}

/// Append-only, id-indexed collection of pollables.
#[derive(Debug, Default)]
pub struct PollableRegistry {
    slots: Vec<Pollable>,
}

impl PollableRegistry {
    /// Largest number of pollables a guest can address with a non-negative
    /// `i32` id.
    pub const MAX_POLLABLES: usize = i32::MAX as usize;

    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id the next subscription will receive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdSpaceExhausted`] once every guest-addressable id
    /// has been issued.
    pub fn next_id(&self) -> Result<PollableId> {
        let issued = self.slots.len();
        if issued >= Self::MAX_POLLABLES {
            return Err(Error::IdSpaceExhausted { issued });
        }
        u32::try_from(issued)
            .map(PollableId::new)
            .map_err(|_| Error::IdSpaceExhausted { issued })
    }

    /// Appends a pollable built by `make` with the next sequential id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdSpaceExhausted`] if no id is left.
    pub fn push_with(&mut self, make: impl FnOnce(PollableId) -> Pollable) -> Result<PollableId> {
        let id = self.next_id()?;
        let pollable = make(id);
        debug_assert_eq!(pollable.id(), id);
        self.slots.push(pollable);
        Ok(id)
    }

    /// Creates a timer-backed pollable and returns its id without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdSpaceExhausted`] if no id is left.
    pub fn subscribe_timer(&mut self, delay: Duration) -> Result<PollableId> {
        self.push_with(|id| Pollable::timer(id, delay))
    }

    /// Resolves a previously issued id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPollable`] if the id was never issued.
    pub fn lookup(&self, id: PollableId) -> Result<&Pollable> {
        self.slots
            .get(id.as_index())
            .ok_or(Error::UnknownPollable { id })
    }

    /// Number of pollables issued so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if nothing has been subscribed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over all pollables in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Pollable> {
        self.slots.iter()
    }
}
