//! Implementation of the `leasehold clear` command.
//!
//! Operator override for a stuck lock. An expired lease can be cleared
//! freely; a live one requires `--force`, since its holder may still be
//! working and will only notice the loss at its next renewal.

use super::resolve_config;
use crate::cli::ClearArgs;
use leasehold::error::{LeaseError, Result};
use leasehold::store::{FileLockStore, LockKey, LockRecord, LockStore};
use std::time::Duration;
use tracing::warn;

/// Execute the `leasehold clear` command.
pub fn cmd_clear(args: ClearArgs) -> Result<()> {
    let config = resolve_config(&args.store)?;
    let store = FileLockStore::from_config(&config);
    let key: LockKey = args.key.parse()?;

    match clear_record(&store, &key, config.lease_duration(), args.force)? {
        Some(record) => {
            println!("Cleared lock: {}", record.key);
            println!();
            println!("Lock details:");
            println!("  Holder:     {}", record.holder_id);
            println!(
                "  Acquired:   {}",
                record.acquire_time.format("%Y-%m-%d %H:%M:%S%.3f UTC")
            );
            println!("  Age:        {}", record.age_string(store.now()));
        }
        None => println!("No lock record for {}.", key),
    }
    Ok(())
}

/// Remove the record for `key`, returning what was removed.
///
/// Refuses to remove an unexpired lease unless `force` is set.
pub(crate) fn clear_record(
    store: &dyn LockStore,
    key: &LockKey,
    lease: Duration,
    force: bool,
) -> Result<Option<LockRecord>> {
    let Some(record) = store.find_by_key(key)? else {
        return Ok(None);
    };

    let expired = record.is_expired(lease, store.now());
    if !expired && !force {
        return Err(LeaseError::UserError(format!(
            "refusing to clear a live lease without --force.\n\n\
             '{}' holds {} and its lease has not expired; clearing it lets\n\
             another client acquire the lock while the holder may still be working.\n\n\
             To clear the lock anyway, run:\n  leasehold clear {} --force",
            record.holder_id, key, key
        )));
    }

    if !expired {
        warn!(key = %key, holder = %record.holder_id, "force-clearing a live lease");
    }

    // Only remove what we inspected, unless forced.
    let removed = if force {
        store.force_delete(key)?
    } else {
        store.delete_if_acquire_time_matches(key, record.acquire_time)?
    };

    if removed == 0 {
        return Err(LeaseError::UserError(format!(
            "lock {} changed while clearing it; run `leasehold status` and retry",
            key
        )));
    }
    Ok(Some(record))
}
