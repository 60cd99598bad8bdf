//! Single-flight coordination of session refreshes.
//!
//! State machine per client: `Idle -> InFlight -> Settled -> Idle`.
//! The first caller that finds the coordinator idle starts the refresh;
//! everyone else joins the shared outcome. A settled outcome stays visible
//! for the settle delay so late 401s reuse it instead of refreshing again.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use reqwest::StatusCode;

/// Result of one refresh call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The refresh endpoint answered 2xx
    Renewed,
    /// The refresh endpoint answered with a non-success status
    Rejected(StatusCode),
    /// The refresh call never got an answer (network failure, task failure)
    Unreachable,
}

impl RefreshOutcome {
    pub fn is_renewed(self) -> bool {
        matches!(self, RefreshOutcome::Renewed)
    }
}

type SharedOutcome = Shared<BoxFuture<'static, RefreshOutcome>>;

enum RefreshState {
    Idle,
    InFlight {
        generation: u64,
        outcome: SharedOutcome,
    },
    Settled {
        generation: u64,
        outcome: RefreshOutcome,
    },
}

struct Slot {
    state: RefreshState,
    next_generation: u64,
}

/// Observable phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    InFlight,
    Settled(RefreshOutcome),
}

pub struct RefreshCoordinator {
    slot: Arc<Mutex<Slot>>,
    settle_delay: Duration,
}

impl RefreshCoordinator {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                state: RefreshState::Idle,
                next_generation: 0,
            })),
            settle_delay,
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        match &lock(&self.slot).state {
            RefreshState::Idle => RefreshPhase::Idle,
            RefreshState::InFlight { .. } => RefreshPhase::InFlight,
            RefreshState::Settled { outcome, .. } => RefreshPhase::Settled(*outcome),
        }
    }

    /// Returns the outcome of the current refresh, starting one with `start`
    /// only when none is in flight or settled.
    ///
    /// The check-and-set happens under the lock with no await in between, so
    /// concurrent callers can never start two refreshes.
    pub async fn run<F>(&self, start: F) -> RefreshOutcome
    where
        F: FnOnce() -> BoxFuture<'static, RefreshOutcome>,
    {
        let pending = {
            let mut slot = lock(&self.slot);
            let joined = match &slot.state {
                RefreshState::Settled { outcome, .. } => return *outcome,
                RefreshState::InFlight { outcome, .. } => Some(outcome.clone()),
                RefreshState::Idle => None,
            };

            if let Some(outcome) = joined {
                outcome
            } else {
                let generation = slot.next_generation;
                slot.next_generation += 1;
                let outcome = self.launch(generation, start());
                slot.state = RefreshState::InFlight {
                    generation,
                    outcome: outcome.clone(),
                };
                tracing::debug!(generation, "session refresh started");
                outcome
            }
        };

        pending.await
    }

    /// Spawns the refresh so it completes even if every waiter is dropped.
    fn launch(&self, generation: u64, refresh: BoxFuture<'static, RefreshOutcome>) -> SharedOutcome {
        let slot = Arc::clone(&self.slot);
        let settle_delay = self.settle_delay;

        let task = tokio::spawn(async move {
            let outcome = refresh.await;
            settle(&slot, generation, outcome);
            tokio::spawn(async move {
                tokio::time::sleep(settle_delay).await;
                clear(&slot, generation);
            });
            outcome
        });

        async move { task.await.unwrap_or(RefreshOutcome::Unreachable) }
            .boxed()
            .shared()
    }
}

fn lock(slot: &Mutex<Slot>) -> std::sync::MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn settle(slot: &Mutex<Slot>, generation: u64, outcome: RefreshOutcome) {
    let mut slot = lock(slot);
    if matches!(slot.state, RefreshState::InFlight { generation: g, .. } if g == generation) {
        slot.state = RefreshState::Settled {
            generation,
            outcome,
        };
        tracing::debug!(generation, ?outcome, "session refresh settled");
    }
}

fn clear(slot: &Mutex<Slot>, generation: u64) {
    let mut slot = lock(slot);
    if matches!(slot.state, RefreshState::Settled { generation: g, .. } if g == generation) {
        slot.state = RefreshState::Idle;
    }
}
