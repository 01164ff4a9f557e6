//! OneFile Cache - command-line front end
//!
//! Drives a single store against the local filesystem.
//!
//! ```text
//! onefile_cache <store-name> <definition> <command> [args...]
//! ```

use std::env;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onefile_cache::{CacheStats, LocalHost, OneFileStore, StoreConfig};

const USAGE: &str = "usage: onefile_cache <store-name> <definition> <command> [args...]

commands:
  get <key>...          print values as JSON (null when absent)
  set <key> <value>     store a JSON value (plain text is stored as a string)
  delete <key>...       remove keys
  has <key>...          print whether every key is present
  keys [prefix]         list keys, optionally filtered by prefix
  purge                 remove every key of the definition
  stats                 print activity counters and hit rate as JSON
  drop-instance         delete every definition and the store root";

/// Main entry point for the OneFile Cache CLI.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the store and bind it to the requested definition
/// 4. Run the command
/// 5. Close the store, flushing any changes
fn main() -> ExitCode {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onefile_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<()> {
    let [name, definition, command, rest @ ..] = args.as_slice() else {
        bail!("{}", USAGE);
    };

    let config = StoreConfig::from_env();
    info!(
        "Configuration loaded: path={:?}, autocreate={}, ttl={}s",
        config.path, config.autocreate, config.ttl
    );

    let mut store: OneFileStore = OneFileStore::new(name.as_str(), config, LocalHost::from_env());
    if !store.is_ready() {
        bail!("store `{}` is not ready, check ONEFILE_PATH", name);
    }
    store.instance_created();
    store
        .initialise(definition.as_str())
        .with_context(|| format!("failed to load definition `{}`", definition))?;

    match (command.as_str(), rest) {
        ("get", keys) if !keys.is_empty() => {
            for (key, value) in keys.iter().map(|k| (k, store.get(k))) {
                println!("{}\t{}", key, value.unwrap_or(Value::Null));
            }
        }
        ("set", [key, value]) => {
            store.set(key.as_str(), parse_value(value));
        }
        ("delete", keys) if !keys.is_empty() => {
            println!("{}", store.delete_many(keys));
        }
        ("has", keys) if !keys.is_empty() => {
            println!("{}", store.has_all(keys));
        }
        ("keys", []) => print_keys(store.find_all()),
        ("keys", [prefix]) => print_keys(store.find_by_prefix(prefix)),
        ("purge", []) => {
            store.purge();
        }
        ("stats", []) => {
            println!("{}", serde_json::to_string_pretty(&stats_report(&store.stats())?)?);
        }
        ("drop-instance", []) => {
            if !store.instance_deleted() {
                bail!("failed to delete store `{}`", name);
            }
            return Ok(());
        }
        _ => bail!("{}", USAGE),
    }

    let written = store.close().context("failed to write cache files")?;
    info!("Store closed (files written: {})", written);
    Ok(())
}

/// Parses a JSON value, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Activity counters plus the derived hit rate.
fn stats_report(stats: &CacheStats) -> Result<Value> {
    let mut report = serde_json::to_value(stats)?;
    if let Value::Object(fields) = &mut report {
        fields.insert("hit_rate".to_string(), stats.hit_rate().into());
    }
    Ok(report)
}

fn print_keys(keys: impl IntoIterator<Item = String>) {
    let mut keys: Vec<String> = keys.into_iter().collect();
    keys.sort();
    for key in keys {
        println!("{}", key);
    }
}
