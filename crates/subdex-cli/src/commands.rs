use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::Value;
use subdex_format::subdir::ID_FIELD;
use subdex_format::IndexSnapshot;
use subdex_store::{IndexStore, StoreConfig, StoreEvent, Subdir, WriteOrder};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => StoreConfig::default(),
    };

    match cli.command {
        Command::Config => cmd_config(&config),
        Command::List => {
            let store = open_store(&cli.index, &config).await?;
            print_index(&store.snapshot(), &cli.format)
        }
        Command::Add(args) => cmd_add(&open_store(&cli.index, &config).await?, args).await,
        Command::Remove(args) => cmd_remove(&open_store(&cli.index, &config).await?, args).await,
        Command::Reset => cmd_reset(&open_store(&cli.index, &config).await?).await,
        Command::Watch => cmd_watch(&open_store(&cli.index, &config).await?, &cli.format).await,
    }
}

/// Open the index and wait until the first read has landed.
async fn open_store(index: &Path, config: &StoreConfig) -> anyhow::Result<IndexStore> {
    let store = IndexStore::open_path(index, config)
        .with_context(|| format!("opening index {}", index.display()))?;
    store
        .settle()
        .await
        .with_context(|| format!("reading index {}", index.display()))?;
    Ok(store)
}

async fn cmd_add(store: &IndexStore, args: AddArgs) -> anyhow::Result<()> {
    if store.contains(&args.id) {
        println!("{} {} already exists, index unchanged", "!".yellow().bold(), args.id.bold());
        return Ok(());
    }

    let mut entry = Subdir::new(args.id.as_str());
    for raw in &args.fields {
        let (key, value) = parse_field(raw)?;
        entry = entry.with_field(key, value);
    }

    store.order(WriteOrder::add(entry));
    store.settle().await?;
    if !store.contains(&args.id) {
        bail!("{} was not written, see the log for details", args.id);
    }
    println!("{} Added {}", "✓".green().bold(), args.id.bold());
    Ok(())
}

async fn cmd_remove(store: &IndexStore, args: RemoveArgs) -> anyhow::Result<()> {
    if !store.contains(&args.id) {
        println!("{} {} does not exist, index unchanged", "!".yellow().bold(), args.id.bold());
        return Ok(());
    }

    store.order(WriteOrder::delete(Subdir::new(args.id.as_str())));
    store.settle().await?;
    if store.contains(&args.id) {
        bail!("{} was not removed, see the log for details", args.id);
    }
    println!("{} Removed {}", "✓".green().bold(), args.id.bold());
    Ok(())
}

async fn cmd_reset(store: &IndexStore) -> anyhow::Result<()> {
    let before = store.len();
    store.order(WriteOrder::reset());
    store.settle().await?;
    if !store.is_empty() {
        bail!("index was not reset, see the log for details");
    }
    println!("{} Reset index ({} entries removed)", "✓".green().bold(), before);
    Ok(())
}

async fn cmd_watch(store: &IndexStore, format: &OutputFormat) -> anyhow::Result<()> {
    let mut events = store.subscribe();
    print_index(&store.snapshot(), format)?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(StoreEvent::SubdirsChanged) => {
                    println!("{}", "-- index changed --".dimmed());
                    print_index(&store.snapshot(), format)?;
                }
                Ok(StoreEvent::Faulted(message)) => {
                    eprintln!("{} {}", "error:".red().bold(), message);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "watch output lagged behind store events");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn cmd_config(config: &StoreConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn print_index(snapshot: &IndexSnapshot, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let bytes = subdex_format::encode(&snapshot.to_file(), true)?;
            print!("{}", String::from_utf8_lossy(&bytes));
        }
        OutputFormat::Text => {
            if let Some(comment) = snapshot.comment() {
                println!("{}", comment.dimmed());
            }
            if snapshot.is_empty() {
                println!("No subdirs.");
            }
            for subdir in snapshot.subdirs().values() {
                if subdir.extra.is_empty() {
                    println!("{}", subdir.id.yellow().bold());
                } else {
                    let extra = Value::Object(subdir.extra.clone());
                    println!("{}  {}", subdir.id.yellow().bold(), extra);
                }
            }
        }
    }
    Ok(())
}

/// Split `KEY=VALUE`. The value is read as JSON when it parses, otherwise
/// it is kept as a plain string.
fn parse_field(raw: &str) -> anyhow::Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("field {raw:?} is not in KEY=VALUE form");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("field {raw:?} has an empty key");
    }
    if key == ID_FIELD {
        bail!("the id is given as the positional argument, not as a field");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_values_are_json_when_possible() {
        assert_eq!(parse_field("n=3").unwrap(), ("n".to_string(), json!(3)));
        assert_eq!(parse_field("on=true").unwrap(), ("on".to_string(), json!(true)));
        assert_eq!(
            parse_field("tags=[\"a\",\"b\"]").unwrap(),
            ("tags".to_string(), json!(["a", "b"]))
        );
    }

    #[test]
    fn field_values_fall_back_to_strings() {
        assert_eq!(parse_field("title=My Maps").unwrap(), ("title".to_string(), json!("My Maps")));
        assert_eq!(parse_field("empty=").unwrap(), ("empty".to_string(), json!("")));
        assert_eq!(parse_field("eq=a=b").unwrap(), ("eq".to_string(), json!("a=b")));
    }

    #[test]
    fn malformed_fields_are_rejected() {
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=x").is_err());
        assert!(parse_field("id=other").is_err());
    }

    #[tokio::test]
    async fn add_then_remove_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let config = StoreConfig {
            sync_on_write: false,
            ..StoreConfig::default()
        };
        let store = IndexStore::open_path(&path, &config).unwrap();
        store.settle().await.unwrap();

        let args = AddArgs {
            id: "maps".into(),
            fields: vec!["title=Maps".into()],
        };
        cmd_add(&store, args).await.unwrap();
        assert_eq!(store.get("maps").unwrap().field("title"), Some(&json!("Maps")));

        cmd_remove(&store, RemoveArgs { id: "maps".into() }).await.unwrap();
        assert!(!store.contains("maps"));
        store.close();
    }
}
