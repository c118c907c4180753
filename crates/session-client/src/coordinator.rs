//! Single-flight refresh coordination
//!
//! At most one refresh runs per client at a time. The first request to see a
//! 401 becomes the leader; every request that fails with 401 while the
//! leader is running parks in a FIFO queue and is resolved with the leader's
//! outcome. Becoming the leader is a check-and-set under one lock, so two
//! simultaneous 401s can never both start a refresh.
//!
//! The coordinator knows nothing about HTTP. The leader does the actual
//! refresh work and hands the outcome back through [`LeaderGuard::release`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

/// Why a refresh produced no token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("{0}")]
    Rejected(String),

    /// The leader went away without reporting an outcome
    #[error("refresh abandoned before completion")]
    Abandoned,
}

/// New access token on success.
pub type RefreshOutcome = Result<String, RefreshFailure>;

/// Queue position handed to a parked request.
pub type WaiterId = u64;

enum State {
    Idle,
    Refreshing {
        waiters: VecDeque<(WaiterId, oneshot::Sender<RefreshOutcome>)>,
    },
}

struct Inner {
    state: State,
    next_id: WaiterId,
    /// Completed refresh cycles
    cycles: u64,
}

/// Shared single-flight state. Cloning yields a handle to the same state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Mutex<Inner>>,
}

/// What a request that just saw a 401 should do.
pub enum Role {
    /// Perform the refresh, then call [`LeaderGuard::release`]
    Leader(LeaderGuard),
    /// A refresh is already running; await its outcome
    Waiter(WaitHandle),
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Idle,
                next_id: 0,
                cycles: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Never held across an await, and no code path panics while holding it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically become the refresh leader, or join the current refresh.
    pub fn try_become_leader(&self) -> Role {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match &mut inner.state {
            State::Refreshing { waiters } => {
                let id = inner.next_id;
                inner.next_id += 1;
                let (tx, rx) = oneshot::channel();
                waiters.push_back((id, tx));
                debug!(waiter = id, queued = waiters.len(), "refresh in flight, parked");
                Role::Waiter(WaitHandle {
                    coordinator: self.clone(),
                    id,
                    rx,
                })
            }
            State::Idle => {
                inner.state = State::Refreshing {
                    waiters: VecDeque::new(),
                };
                debug!("refresh started, caller is leader");
                Role::Leader(LeaderGuard {
                    coordinator: self.clone(),
                    released: false,
                })
            }
        }
    }

    /// A refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(self.lock().state, State::Refreshing { .. })
    }

    /// Number of parked requests.
    pub fn waiting(&self) -> usize {
        waiters_len(&self.lock().state)
    }

    /// Number of refresh cycles that have completed (either outcome).
    pub fn cycles(&self) -> u64 {
        self.lock().cycles
    }

    /// End the current cycle and resolve every waiter, oldest first.
    fn finish(&self, outcome: RefreshOutcome) -> Vec<WaiterId> {
        let waiters = {
            let mut inner = self.lock();
            inner.cycles += 1;
            match std::mem::replace(&mut inner.state, State::Idle) {
                State::Refreshing { waiters } => waiters,
                State::Idle => VecDeque::new(),
            }
        };

        let mut resolved = Vec::with_capacity(waiters.len());
        for (id, tx) in waiters {
            // A send error means the waiter was dropped after we took the queue
            if tx.send(outcome.clone()).is_ok() {
                resolved.push(id);
            }
        }
        resolved
    }

    fn cancel(&self, id: WaiterId) {
        let mut inner = self.lock();
        if let State::Refreshing { waiters } = &mut inner.state {
            waiters.retain(|(waiter, _)| *waiter != id);
        }
    }
}

fn waiters_len(state: &State) -> usize {
    match state {
        State::Idle => 0,
        State::Refreshing { waiters } => waiters.len(),
    }
}

/// Proof of leadership for the current refresh cycle.
///
/// Dropping the guard without calling `release` rejects all waiters with
/// [`RefreshFailure::Abandoned`] so nobody waits forever.
pub struct LeaderGuard {
    coordinator: RefreshCoordinator,
    released: bool,
}

impl LeaderGuard {
    /// Publish the outcome. Returns the ids of the waiters that received it,
    /// in the order they were queued.
    pub fn release(mut self, outcome: RefreshOutcome) -> Vec<WaiterId> {
        self.released = true;
        let resolved = self.coordinator.finish(outcome);
        debug!(waiters = resolved.len(), "refresh cycle finished");
        resolved
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.released {
            self.coordinator.finish(Err(RefreshFailure::Abandoned));
        }
    }
}

/// A parked request. Dropping it before the outcome arrives removes it from
/// the queue.
pub struct WaitHandle {
    coordinator: RefreshCoordinator,
    id: WaiterId,
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl WaitHandle {
    pub fn id(&self) -> WaiterId {
        self.id
    }

    /// Wait for the leader's outcome.
    pub async fn wait(mut self) -> RefreshOutcome {
        match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RefreshFailure::Abandoned),
        }
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        self.coordinator.cancel(self.id);
    }
}
