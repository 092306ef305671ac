//! Lock record and key types.

use crate::error::{LeaseError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace holding the single store-wide lock record.
pub const GLOBAL_LOCK_NAMESPACE: &str = "global_lock";

/// Namespace holding per-document lock records.
pub const DOCUMENT_LOCK_NAMESPACE: &str = "document_lock";

/// Fixed record id shared by every client of the global lock.
pub const GLOBAL_LOCK_ID: &str = "54235CB7-9072-4DB9-AF2C-298AE7D39AB7";

/// Separator between the target id and collection name in a scoped key.
pub const SCOPED_KEY_SEPARATOR: &str = "_#_";

/// Identity of a protected resource.
///
/// The store holds at most one [`LockRecord`] per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LockKey {
    /// Record namespace (`global_lock` or `document_lock`).
    pub namespace: String,

    /// Record id within the namespace.
    pub id: String,
}

impl LockKey {
    /// The key of the store-wide global lock.
    pub fn global() -> Self {
        Self {
            namespace: GLOBAL_LOCK_NAMESPACE.to_string(),
            id: GLOBAL_LOCK_ID.to_string(),
        }
    }

    /// The key of a lock scoped to one document of a business collection.
    pub fn scoped(target_id: &str, collection: &str) -> Self {
        Self {
            namespace: DOCUMENT_LOCK_NAMESPACE.to_string(),
            id: format!("{}{}{}", target_id, SCOPED_KEY_SEPARATOR, collection),
        }
    }

    /// Split a scoped key back into `(target_id, collection)`.
    pub fn scoped_parts(&self) -> Option<(&str, &str)> {
        if self.namespace != DOCUMENT_LOCK_NAMESPACE {
            return None;
        }
        self.id.split_once(SCOPED_KEY_SEPARATOR)
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}

impl FromStr for LockKey {
    type Err = LeaseError;

    /// Parse the `namespace/id` form produced by `Display`.
    ///
    /// The bare word `global` is accepted as shorthand for the global key.
    fn from_str(s: &str) -> Result<Self> {
        if s == "global" {
            return Ok(Self::global());
        }

        match s.split_once('/') {
            Some((namespace, id)) if !namespace.is_empty() && !id.is_empty() => Ok(Self {
                namespace: namespace.to_string(),
                id: id.to_string(),
            }),
            _ => Err(LeaseError::UserError(format!(
                "invalid lock key '{}': expected 'namespace/id' or 'global'",
                s
            ))),
        }
    }
}

/// The persisted unit of truth for one lock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// The protected resource.
    pub key: LockKey,

    /// Client currently believed to hold the lock.
    pub holder_id: String,

    /// Store time at which the claim was established or last renewed.
    pub acquire_time: DateTime<Utc>,
}

impl LockRecord {
    /// Create a record, truncating `acquire_time` to whole milliseconds.
    pub fn new(key: LockKey, holder_id: &str, acquire_time: DateTime<Utc>) -> Self {
        Self {
            key,
            holder_id: holder_id.to_string(),
            acquire_time: truncate_millis(acquire_time),
        }
    }

    /// The instant the current lease runs out.
    pub fn expires_at(&self, lease: std::time::Duration) -> Option<DateTime<Utc>> {
        let lease = Duration::from_std(lease).ok()?;
        self.acquire_time.checked_add_signed(lease)
    }

    /// Whether the lease ran out before `now`.
    pub fn is_expired(&self, lease: std::time::Duration, now: DateTime<Utc>) -> bool {
        match self.expires_at(lease) {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Time elapsed since the last claim or renewal.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.acquire_time)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self, now: DateTime<Utc>) -> String {
        let age = self.age(now);
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else if seconds > 0 {
            format!("{}s", seconds)
        } else {
            format!("{}ms", age.num_milliseconds().max(0))
        }
    }
}

/// Truncate a timestamp to millisecond precision.
///
/// Stored acquire times are compared for equality in compare-and-delete, so
/// they must survive serialization unchanged.
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}
