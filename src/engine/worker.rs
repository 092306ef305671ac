//! The polling loop behind an engine.

use super::state::{EngineState, wait_interval};
use crate::lock::ExclusiveLock;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

pub(super) type OnAcquired = Box<dyn FnMut() + Send + 'static>;
pub(super) type OnLost = Box<dyn FnMut(String) + Send + 'static>;

pub(super) fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// State shared between an engine handle and its worker.
#[derive(Default)]
pub(super) struct Shared {
    stop: Mutex<bool>,
    wake: Condvar,
    state: Mutex<EngineState>,
}

impl Shared {
    /// Ask the worker to exit and interrupt its current wait.
    pub(super) fn signal_stop(&self) {
        *locked(&self.stop) = true;
        self.wake.notify_all();
    }

    pub(super) fn is_stopping(&self) -> bool {
        *locked(&self.stop)
    }

    /// Sleep for `timeout` unless stopped first. Returns whether a stop was signalled.
    fn wait_for_stop(&self, timeout: Duration) -> bool {
        let stop = locked(&self.stop);
        let (stop, _) = self
            .wake
            .wait_timeout_while(stop, timeout, |stop| !*stop)
            .unwrap_or_else(|poison| poison.into_inner());
        *stop
    }

    pub(super) fn state(&self) -> EngineState {
        *locked(&self.state)
    }

    pub(super) fn set_state(&self, state: EngineState) {
        *locked(&self.state) = state;
    }
}

pub(super) struct Worker {
    pub(super) lock: Arc<dyn ExclusiveLock>,
    pub(super) poll_interval: Duration,
    pub(super) client_id: String,
    pub(super) on_acquired: OnAcquired,
    pub(super) on_lost: OnLost,
    pub(super) shared: Arc<Shared>,
}

impl Worker {
    pub(super) fn run(mut self) {
        let mut state = EngineState::Idle;

        while !self.shared.is_stopping() {
            state = self.poll(state);
            self.shared.set_state(state);

            let wait = wait_interval(
                state,
                self.lock.last_acquired_time(),
                self.lock.lease_duration(),
                self.poll_interval,
                self.lock.now(),
            );
            if self.shared.wait_for_stop(wait) {
                break;
            }
        }

        if state == EngineState::Held {
            self.lock.release(&self.client_id);
        }
        self.shared.set_state(EngineState::Stopped);
        info!(client_id = %self.client_id, "lock engine stopped");
    }

    /// Run one claim or renewal and fire the callback for a transition.
    fn poll(&mut self, state: EngineState) -> EngineState {
        match state {
            EngineState::Held => match self.lock.renew(&self.client_id) {
                Ok(_) => EngineState::Held,
                Err(lost) => {
                    warn!(client_id = %self.client_id, reason = %lost, "lock lost");
                    self.shared.set_state(EngineState::Idle);
                    (self.on_lost)(lost.to_string());
                    EngineState::Idle
                }
            },
            _ => {
                if self.lock.try_claim(&self.client_id) {
                    info!(client_id = %self.client_id, "lock acquired");
                    self.shared.set_state(EngineState::Held);
                    (self.on_acquired)();
                    EngineState::Held
                } else {
                    EngineState::Idle
                }
            }
        }
    }
}
