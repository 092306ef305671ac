//! Engine state and the adaptive wait policy.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Whether this process currently holds the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Not holding; the worker attempts claims.
    #[default]
    Idle,
    /// Holding; the worker renews.
    Held,
    /// The engine was stopped and its worker has exited.
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Held => write!(f, "held"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// How long the worker sleeps before its next claim or renewal.
///
/// While holding, the next renewal is due `max(lease - poll, poll)` after the
/// last acquire time, so it lands one poll interval before expiry without
/// ever running faster than the poll cadence. The result is always within
/// `0..=lease`. Otherwise the worker waits one poll interval.
pub fn wait_interval(
    state: EngineState,
    last_acquired: Option<DateTime<Utc>>,
    lease: Duration,
    poll: Duration,
    now: DateTime<Utc>,
) -> Duration {
    match (state, last_acquired) {
        (EngineState::Held, Some(last)) => {
            let renew_lead = lease.saturating_sub(poll).max(poll);
            let target = chrono::Duration::from_std(renew_lead)
                .ok()
                .and_then(|lead| last.checked_add_signed(lead));

            match target {
                // A target in the past yields a negative delta, which to_std rejects.
                Some(target) => (target - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(lease),
                None => poll.min(lease),
            }
        }
        (EngineState::Held, None) => poll.min(lease),
        _ => poll,
    }
}
