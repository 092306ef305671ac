//! Background engine that keeps one client contending for one lock.
//!
//! The engine owns a single worker thread. While idle it attempts a claim
//! every poll interval; once holding it renews shortly before each lease
//! would expire. Transitions are reported through the two callbacks given to
//! [`ExclusiveLockEngine::start`]:
//!
//! | transition          | callback                  |
//! |---------------------|---------------------------|
//! | `Idle -> Held`      | `on_lock_acquired()`      |
//! | `Held -> Idle`      | `on_lock_lost(reason)`    |
//!
//! Failed claims are silent and retried on the next poll. Stopping wakes the
//! worker immediately and, if the lock is held, releases it before `stop`
//! returns.

mod state;
mod worker;


pub use state::{EngineState, wait_interval};

use crate::error::{LeaseError, Result};
use crate::lock::ExclusiveLock;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};
use worker::{Shared, Worker, locked};

struct Registration {
    client_id: String,
    worker: Option<JoinHandle<()>>,
}

/// Drives one [`ExclusiveLock`] on behalf of one client.
pub struct ExclusiveLockEngine {
    lock: Arc<dyn ExclusiveLock>,
    poll_interval: Duration,
    shared: Arc<Shared>,
    registration: Mutex<Option<Registration>>,
}

impl ExclusiveLockEngine {
    pub fn new(lock: Arc<dyn ExclusiveLock>, poll_interval: Duration) -> Self {
        Self {
            lock,
            poll_interval,
            shared: Arc::new(Shared::default()),
            registration: Mutex::new(None),
        }
    }

    /// Register `client_id` and start contending for the lock.
    ///
    /// Only one client can ever be registered with an engine: a second call
    /// returns [`LeaseError::AlreadyStarted`] and leaves the first registration
    /// running. The lock is initialized before the worker starts, so an
    /// unresolvable lock target is returned here as [`LeaseError::Init`].
    pub fn start<A, L>(&self, client_id: &str, on_lock_acquired: A, on_lock_lost: L) -> Result<()>
    where
        A: FnMut() + Send + 'static,
        L: FnMut(String) + Send + 'static,
    {
        let mut registration = locked(&self.registration);
        if let Some(existing) = registration.as_ref() {
            return Err(LeaseError::AlreadyStarted(existing.client_id.clone()));
        }

        self.lock.initialize()?;

        let worker = Worker {
            lock: self.lock.clone(),
            poll_interval: self.poll_interval,
            client_id: client_id.to_string(),
            on_acquired: Box::new(on_lock_acquired),
            on_lost: Box::new(on_lock_lost),
            shared: self.shared.clone(),
        };

        let handle = thread::Builder::new()
            .name("leasehold-engine".to_string())
            .spawn(move || worker.run())
            .map_err(|e| LeaseError::UserError(format!("failed to spawn lock worker: {}", e)))?;

        info!(
            client_id,
            key = ?self.lock.key(),
            lease_ms = self.lock.lease_duration().as_millis() as u64,
            poll_ms = self.poll_interval.as_millis() as u64,
            "lock engine started"
        );

        *registration = Some(Registration {
            client_id: client_id.to_string(),
            worker: Some(handle),
        });
        Ok(())
    }

    /// Stop contending and release the lock if held.
    ///
    /// Blocks until the worker has exited (and released), unless called from
    /// one of the engine's own callbacks, in which case the worker releases on
    /// its way out. Stopping an engine that was never started, or stopping
    /// twice, does nothing.
    pub fn stop(&self, client_id: &str) -> Result<()> {
        let handle = {
            let mut registration = locked(&self.registration);
            let Some(registration) = registration.as_mut() else {
                return Ok(());
            };
            if registration.client_id != client_id {
                return Err(LeaseError::ClientMismatch {
                    given: client_id.to_string(),
                    registered: registration.client_id.clone(),
                });
            }
            registration.worker.take()
        };

        self.shared.signal_stop();
        if let Some(handle) = handle {
            self.join_worker(handle, client_id);
        }
        Ok(())
    }

    fn join_worker(&self, handle: JoinHandle<()>, client_id: &str) {
        if handle.thread().id() == thread::current().id() {
            return;
        }

        if handle.join().is_err() {
            // The worker died mid-cycle and may not have released.
            warn!(client_id, "lock worker panicked; releasing");
            self.lock.release(client_id);
            self.shared.set_state(EngineState::Stopped);
        }
    }

    /// Current state as last observed by the worker.
    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    pub fn is_held(&self) -> bool {
        self.state() == EngineState::Held
    }

    /// The registered client, if `start` succeeded.
    pub fn client_id(&self) -> Option<String> {
        locked(&self.registration)
            .as_ref()
            .map(|r| r.client_id.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The lock driven by this engine.
    pub fn lock(&self) -> &Arc<dyn ExclusiveLock> {
        &self.lock
    }
}

impl Drop for ExclusiveLockEngine {
    fn drop(&mut self) {
        let running = locked(&self.registration)
            .as_mut()
            .and_then(|r| r.worker.take().map(|handle| (handle, r.client_id.clone())));

        if let Some((handle, client_id)) = running {
            self.shared.signal_stop();
            self.join_worker(handle, &client_id);
        }
    }
}
