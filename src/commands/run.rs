//! Implementation of the `leasehold run` command.
//!
//! Starts an engine on the configured lock and reports transitions on
//! stdout until the operator types `q` or closes stdin.

use super::resolve_config;
use crate::cli::RunArgs;
use leasehold::config::{Config, LockScope};
use leasehold::engine::ExclusiveLockEngine;
use leasehold::error::{LeaseError, Result};
use leasehold::lock::{ExclusiveLock, GlobalExclusiveLock, ScopedExclusiveLock};
use leasehold::store::{FileLockStore, owner_string};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Execute the `leasehold run` command.
pub fn cmd_run(args: RunArgs) -> Result<()> {
    let config = run_config(&args)?;
    let client_id = config.client_id.clone().unwrap_or_else(default_client_id);

    let lock = build_lock(&config);
    let engine = ExclusiveLockEngine::new(lock, config.poll_interval());

    engine.start(
        &client_id,
        || {
            println!("Lock acquired");
            let _ = std::io::stdout().flush();
        },
        |reason| {
            println!("Lock lost, reason: {}", reason);
            let _ = std::io::stdout().flush();
        },
    )?;

    println!(
        "Contending for {} as '{}' (store: {}, lease {} ms, poll {} ms). Type q to stop.",
        describe_scope(&config.scope),
        client_id,
        config.store_root.display(),
        engine.lock().lease_duration().as_millis(),
        engine.poll_interval().as_millis()
    );

    wait_for_quit(std::io::stdin().lock())?;

    info!(client_id = %client_id, "stopping");
    engine.stop(&client_id)
}

/// Resolve the config file and apply the command-line overrides.
fn run_config(args: &RunArgs) -> Result<Config> {
    let mut config = resolve_config(&args.store)?;

    if let Some(lease_ms) = args.lease_ms {
        config.lease_duration_ms = lease_ms;
    }
    if let Some(poll_ms) = args.poll_ms {
        config.poll_interval_ms = poll_ms;
    }
    if let Some(client_id) = &args.client_id {
        config.client_id = Some(client_id.clone());
    }
    if let (Some(collection), Some(value)) = (&args.collection, &args.value) {
        config.scope = LockScope::Scoped {
            collection: collection.clone(),
            field: args.field.clone(),
            value: parse_value(value),
        };
    }

    config.validate()?;
    Ok(config)
}

fn build_lock(config: &Config) -> Arc<dyn ExclusiveLock> {
    let store = Arc::new(FileLockStore::from_config(config));

    if let LockScope::Scoped { collection, .. } = &config.scope
        && let Some(filter) = config.scope.filter()
    {
        return Arc::new(ScopedExclusiveLock::new(
            store.clone(),
            store,
            collection.clone(),
            filter,
            config.lease_duration(),
        ));
    }
    Arc::new(GlobalExclusiveLock::new(store, config.lease_duration()))
}

fn describe_scope(scope: &LockScope) -> String {
    match (scope, scope.filter()) {
        (LockScope::Scoped { collection, .. }, Some(filter)) => {
            format!("the first '{}' document with {}", collection, filter)
        }
        _ => "the global lock".to_string(),
    }
}

/// `user@host/<random>`, unique per run.
pub(crate) fn default_client_id() -> String {
    format!("{}/{}", owner_string(), Uuid::new_v4().simple())
}

/// Interpret a filter value as JSON, falling back to a plain string.
pub(crate) fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Block until a line reading `q` or end of input.
fn wait_for_quit(input: impl BufRead) -> Result<()> {
    for line in input.lines() {
        let line = line.map_err(|e| LeaseError::UserError(format!("failed to read stdin: {}", e)))?;
        if line.trim().eq_ignore_ascii_case("q") {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::StoreArgs;
    use leasehold::store::LockKey;
    use serde_json::json;
    use std::io::Cursor;

    fn run_args() -> RunArgs {
        RunArgs {
            store: StoreArgs {
                config: Some("/nonexistent".into()),
                root: None,
            },
            client_id: None,
            lease_ms: None,
            poll_ms: None,
            collection: None,
            field: "_id".to_string(),
            value: None,
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1"), json!(1));
        assert_eq!(parse_value("\"1\""), json!("1"));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("nightly"), json!("nightly"));
    }

    #[test]
    fn test_default_client_id_is_unique() {
        let a = default_client_id();
        let b = default_client_id();
        assert_ne!(a, b);
        assert!(a.starts_with(&owner_string()));
    }

    #[test]
    fn test_wait_for_quit_stops_on_q_or_eof() {
        assert!(wait_for_quit(Cursor::new("status\nq\nignored\n")).is_ok());
        assert!(wait_for_quit(Cursor::new("")).is_ok());
        assert!(wait_for_quit(Cursor::new("Q")).is_ok());
    }

    #[test]
    fn test_run_config_applies_overrides() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut args = run_args();
        args.store = StoreArgs {
            config: None,
            root: Some(tmp.path().to_path_buf()),
        };
        args.lease_ms = Some(2500);
        args.poll_ms = Some(50);
        args.client_id = Some("builder".to_string());
        args.collection = Some("builds".to_string());
        args.value = Some("7".to_string());

        let config = run_config(&args).unwrap();
        assert_eq!(config.lease_duration_ms, 2500);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.client_id.as_deref(), Some("builder"));
        assert_eq!(config.store_root, tmp.path());
        assert_eq!(
            config.scope,
            LockScope::Scoped {
                collection: "builds".to_string(),
                field: "_id".to_string(),
                value: json!(7),
            }
        );
    }

    #[test]
    fn test_build_lock_uses_scope_filter() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config {
            store_root: tmp.path().to_path_buf(),
            scope: LockScope::Scoped {
                collection: "builds".to_string(),
                field: "branch".to_string(),
                value: json!("main"),
            },
            ..Config::default()
        };
        let collection = FileLockStore::from_config(&config).collection_path("builds");
        std::fs::create_dir_all(collection.parent().unwrap()).unwrap();
        std::fs::write(
            &collection,
            "{\"_id\": 1, \"branch\": \"release\"}\n{\"_id\": 2, \"branch\": \"main\"}\n",
        )
        .unwrap();

        let lock = build_lock(&config);
        lock.initialize().unwrap();
        assert_eq!(lock.key(), Some(LockKey::scoped("2", "builds")));
        assert_eq!(
            describe_scope(&config.scope),
            "the first 'builds' document with branch == \"main\""
        );

        config.scope = LockScope::Global;
        let lock = build_lock(&config);
        lock.initialize().unwrap();
        assert_eq!(lock.key(), Some(LockKey::global()));
        assert_eq!(describe_scope(&config.scope), "the global lock");
    }

    #[test]
    fn test_run_config_rejects_zero_lease() {
        let mut args = run_args();
        args.store.config = None;
        args.lease_ms = Some(0);
        assert!(matches!(run_config(&args), Err(LeaseError::Config(_))));
    }

    #[test]
    fn test_run_config_missing_file_is_error() {
        assert!(run_config(&run_args()).is_err());
    }
}
