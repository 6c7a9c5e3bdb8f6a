use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use persistmap::{Mapping, PersistentStore, StoreConfig, format_by_name};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "persistmap")]
#[command(about = "Inspect and edit persistmap store files")]
struct Cli {
    /// Logical store name, without extension (`cfg` for `cfg.json`)
    #[arg(long, short)]
    store: PathBuf,

    /// Store format
    #[arg(long, default_value = "json")]
    format: String,

    /// Take the store lock around reads and writes
    #[arg(long)]
    lock: bool,

    /// Give up waiting for the lock after this many milliseconds
    #[arg(long)]
    lock_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the whole mapping as JSON
    Show,
    /// Print one value
    Get { key: String },
    /// Set a value. The value is parsed as JSON, falling back to a plain string.
    Set { key: String, value: String },
    /// Remove a key
    Remove { key: String },
    /// Write a timestamped backup
    Backup,
    /// List backups, oldest first
    Backups,
    /// Replace the store contents with a backup
    Restore { backup: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut store = open_store(&cli)?;

    match cli.command {
        Command::Show => {
            read(&mut store)?;
            println!("{}", serde_json::to_string_pretty(store.data())?);
        }
        Command::Get { key } => {
            read(&mut store)?;
            let value = store
                .get(&key)
                .ok_or_else(|| anyhow!("Key '{}' not found in {}", key, store.path().display()))?;
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Command::Set { key, value } => {
            let value = parse_value(&value);
            mutate(&mut store, |data| {
                data.insert(key, value);
            })?;
        }
        Command::Remove { key } => {
            let mut removed = false;
            mutate(&mut store, |data| {
                removed = data.shift_remove(&key).is_some();
            })?;
            if !removed {
                return Err(anyhow!("Key '{}' not found in {}", key, store.path().display()));
            }
        }
        Command::Backup => {
            read(&mut store)?;
            let path = store.create_backup()?;
            println!("{}", path.display());
        }
        Command::Backups => {
            for path in store.backups()? {
                println!("{}", path.display());
            }
        }
        Command::Restore { backup } => {
            let bytes = fs::read(&backup)
                .with_context(|| format!("Failed to read backup {}", backup.display()))?;
            let restored = store
                .format()
                .decode(&bytes)
                .with_context(|| format!("Failed to decode backup {}", backup.display()))?
                .unwrap_or_default();
            mutate(&mut store, |data| *data = restored)?;
            println!("Restored {} from {}", store.path().display(), backup.display());
        }
    }

    Ok(())
}

fn open_store(cli: &Cli) -> Result<PersistentStore> {
    let format = format_by_name(&cli.format)?;
    let mut config = StoreConfig::new().using_locks(cli.lock);
    if let Some(ms) = cli.lock_timeout_ms {
        config = config.lock_timeout(Duration::from_millis(ms));
    }
    Ok(PersistentStore::with_format(&cli.store, format, config))
}

/// Loads under the lock, without writing anything back.
fn read(store: &mut PersistentStore) -> Result<()> {
    let loaded = if store.config().using_locks {
        store.load_locked()
    } else {
        store.load()
    };
    loaded.with_context(|| format!("Failed to load {}", store.path().display()))
}

fn mutate<F>(store: &mut PersistentStore, edit: F) -> Result<()>
where
    F: FnOnce(&mut Mapping),
{
    store
        .with_transaction(|tx| {
            edit(tx);
            Ok::<_, std::convert::Infallible>(())
        })
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Failed to update {}", store.path().display()))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
