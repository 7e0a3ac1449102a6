use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::info;

use tether_core::config::Properties;
use tether_core::observability::init_tracing;
use tether_core::{Executor, Kind, Outcome, Owner};

/// Inspect and exercise a tether store.
#[derive(Debug, Parser)]
#[command(name = "tether", version)]
struct Cli {
    /// YAML properties file; without it an in-memory store is used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Distributed lock operations.
    #[command(subcommand)]
    Lock(LockCommand),

    /// Retry queue operations.
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Register a kind, fail one item, and watch the recovery tick replay it.
    Demo {
        #[arg(long, default_value = "tether-demo")]
        kind: String,

        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

#[derive(Debug, Subcommand)]
enum LockCommand {
    Acquire {
        #[arg(long)]
        source: String,

        /// Defaults to a fresh ULID, printed on success.
        #[arg(long)]
        owner: Option<String>,

        #[arg(long, default_value_t = 30_000)]
        ttl_ms: u64,
    },
    Release {
        #[arg(long)]
        source: String,

        #[arg(long)]
        owner: String,
    },
    Holder {
        #[arg(long)]
        source: String,
    },
}

#[derive(Debug, Subcommand)]
enum QueueCommand {
    /// Number of queued batches.
    Count {
        #[arg(long)]
        kind: String,
    },
    /// Pop and print the oldest batch. The batch is not replayed.
    Drain {
        #[arg(long)]
        kind: String,
    },
}

fn load_properties(path: Option<&PathBuf>) -> Result<Properties> {
    match path {
        Some(path) => {
            Properties::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(Properties::default()),
    }
}

async fn run_lock(executor: &Executor<Value>, command: LockCommand) -> Result<()> {
    let lock = executor.lock();
    match command {
        LockCommand::Acquire {
            source,
            owner,
            ttl_ms,
        } => {
            let owner = owner.map_or_else(Owner::generate, Owner::new);
            let acquired = lock
                .acquire(&source, &owner, Duration::from_millis(ttl_ms))
                .await?;
            println!("{}", json!({ "source": source, "owner": owner, "acquired": acquired }));
        }
        LockCommand::Release { source, owner } => {
            let released = lock.release(&source, &Owner::new(owner.clone())).await?;
            println!("{}", json!({ "source": source, "owner": owner, "released": released }));
        }
        LockCommand::Holder { source } => {
            let holder = lock.holder(&source).await?;
            println!("{}", json!({ "source": source, "holder": holder }));
        }
    }
    Ok(())
}

async fn run_queue(executor: &Executor<Value>, command: QueueCommand) -> Result<()> {
    match command {
        QueueCommand::Count { kind } => {
            let queue = executor.queue(&Kind::new(kind.as_str()));
            let count = queue.count().await?;
            println!("{}", json!({ "queue": queue.key(), "count": count }));
        }
        QueueCommand::Drain { kind } => {
            let queue = executor.queue(&Kind::new(kind.as_str()));
            let batch = queue.drain().await?;
            println!("{}", json!({ "queue": queue.key(), "batch": batch }));
        }
    }
    Ok(())
}

/// exec ["good", "bad"] with a callback that refuses "bad" once, then wait for
/// the recovery tick to replay it.
async fn run_demo(executor: &Executor<Value>, kind: String, interval: Duration) -> Result<()> {
    let kind = Kind::new(kind);
    let refused = Arc::new(AtomicBool::new(false));
    let callback = move |items: Vec<Value>| {
        let refused = Arc::clone(&refused);
        async move {
            if items.iter().any(|i| i == "bad") && !refused.swap(true, Ordering::SeqCst) {
                return Outcome::failure("refusing \"bad\" on first sight");
            }
            info!(items = %serde_json::Value::from(items), "callback handled items");
            Outcome::success()
        }
    };

    let handle = executor.register(&kind, interval, callback).await?;
    let report = executor
        .exec(&kind, vec![json!("good"), json!("bad")])
        .await?;
    let queue = executor.queue(&kind);
    println!(
        "{}",
        json!({ "step": "exec", "report": report, "queued": queue.count().await? })
    );

    sleep(interval + interval / 2).await;
    let remaining = queue.count().await?;
    println!("{}", json!({ "step": "recovered", "queued": remaining }));
    handle.shutdown().await;

    if remaining != 0 {
        bail!("{remaining} batch(es) still queued for {kind}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let props = load_properties(cli.config.as_ref())?;
    let executor: Executor<Value> = Executor::from_properties(&props)
        .await
        .context("connecting to store")?;

    match cli.command {
        Command::Lock(command) => run_lock(&executor, command).await,
        Command::Queue(command) => run_queue(&executor, command).await,
        Command::Demo { kind, interval_ms } => {
            run_demo(&executor, kind, Duration::from_millis(interval_ms)).await
        }
    }
}
