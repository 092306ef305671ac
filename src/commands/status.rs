//! Implementation of the `leasehold status` command.
//!
//! Lists every lock record in the store with its holder and age, flagging
//! leases that have expired (their holder stopped renewing).

use super::resolve_config;
use crate::cli::StoreArgs;
use leasehold::config::Config;
use leasehold::error::Result;
use leasehold::store::{FileLockStore, LockRecord, LockStore};

/// Execute the `leasehold status` command.
pub fn cmd_status(args: StoreArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let store = FileLockStore::from_config(&config);
    let records = store.list(None)?;

    print!("{}", render_status(&store, &records, &config));
    Ok(())
}

fn render_status(store: &dyn LockStore, records: &[LockRecord], config: &Config) -> String {
    let mut out = String::new();

    if records.is_empty() {
        out.push_str("No lock records.\n");
        return out;
    }

    let now = store.now();
    let lease = config.lease_duration();

    out.push_str(&format!("Lock records ({}):\n\n", records.len()));
    for record in records {
        out.push_str(&format!("  {}:\n", record.key));
        if let Some((target_id, collection)) = record.key.scoped_parts() {
            out.push_str(&format!(
                "    Target:     document {} in '{}'\n",
                target_id, collection
            ));
        }
        out.push_str(&format!("    Holder:     {}\n", record.holder_id));
        out.push_str(&format!(
            "    Acquired:   {}\n",
            record.acquire_time.format("%Y-%m-%d %H:%M:%S%.3f UTC")
        ));
        out.push_str(&format!("    Age:        {}\n", record.age_string(now)));
        if record.is_expired(lease, now) {
            out.push_str(&format!(
                "    Status:     EXPIRED (lease {} ms)\n",
                config.lease_duration_ms
            ));
        }
        out.push('\n');
    }

    let expired = records.iter().filter(|r| r.is_expired(lease, now)).count();
    if expired > 0 {
        out.push_str(&format!(
            "Note: {} lease(s) expired. The next claim takes them over, or use `leasehold clear <key>`.\n",
            expired
        ));
    }

    out
}
