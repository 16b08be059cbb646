//! wald CLI
//!
//! Command-line interface for exercising the write-ahead log. Each
//! invocation opens the WAL, runs one command and closes it again; the open
//! transaction is remembered between invocations by the tracker file.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use wald::tracker::TxnTracker;
use wald::{Config, RecoveryPolicy, Wal, WalError};

/// wald CLI
#[derive(Parser, Debug)]
#[command(name = "wald")]
#[command(about = "Segmented write-ahead log with transactions")]
#[command(version)]
struct Args {
    /// Directory holding the WAL segments
    #[arg(short, long, default_value = "./data/wal")]
    dir: PathBuf,

    /// Fsync after every write
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    sync: bool,

    /// Maximum size of each segment file in bytes
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    segment_size: u64,

    /// Size of the write buffer in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    buffer_size: usize,

    /// Interval of the background flusher in milliseconds
    #[arg(long, default_value_t = 1000)]
    flush_interval_ms: u64,

    /// Cut a damaged log tail on open instead of refusing to start
    #[arg(long)]
    truncate_tail: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a key-value pair outside any transaction
    Write {
        /// The key to write
        key: String,

        /// The value to write
        value: String,
    },

    /// Print every committed record
    Read,

    /// Begin a new transaction
    BeginTx,

    /// Write a key-value pair in the open transaction
    TxWrite {
        /// The key to write
        key: String,

        /// The value to write
        value: String,
    },

    /// Commit the open transaction
    Commit,

    /// Abort the open transaction
    Abort,

    /// Show recovery state: last sequence and unresolved transactions
    Status,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,wald=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> wald::Result<()> {
    // The directory must exist before it can be resolved and before the
    // tracker writes its state file.
    std::fs::create_dir_all(&args.dir)
        .map_err(|e| WalError::io("create WAL directory", &args.dir, e))?;
    let dir = std::fs::canonicalize(&args.dir)
        .map_err(|e| WalError::io("resolve WAL directory", &args.dir, e))?;

    let policy = if args.truncate_tail {
        RecoveryPolicy::TruncateTail
    } else {
        RecoveryPolicy::Strict
    };

    let config = Config::builder()
        .dir(&dir)
        .sync(args.sync)
        .max_segment_bytes(args.segment_size)
        .buffer_bytes(args.buffer_size)
        .flush_interval(Duration::from_millis(args.flush_interval_ms))
        .recovery_policy(policy)
        .build();

    let tracker = TxnTracker::new(&dir);

    match args.command {
        Commands::Write { key, value } => with_wal(config, |wal| {
            let sequence = wal.write(0, key.as_bytes(), value.as_bytes())?;
            println!("Wrote record: LSN={}, key={}, value={}", sequence, key, value);
            Ok(())
        }),

        Commands::Read => with_wal(config, |wal| {
            let records = wal.read_all()?;
            println!("Records in WAL:");
            println!("{:<8} | {:<5} | {:<10} | {:<16} | Value", "LSN", "TxID", "Type", "Key");
            println!("{:-<8}-|-{:-<5}-|-{:-<10}-|-{:-<16}-|-{:-<16}", "", "", "", "", "");
            for record in records {
                println!(
                    "{:<8} | {:<5} | {:<10} | {:<16} | {}",
                    record.sequence,
                    record.transaction_id,
                    format!("{:?}", record.record_type),
                    String::from_utf8_lossy(&record.key),
                    String::from_utf8_lossy(&record.value)
                );
            }
            Ok(())
        }),

        Commands::BeginTx => {
            // The WAL must open, and the new id must not collide with any
            // transaction the log already mentions.
            let mut txn_id = 0;
            with_wal(config, |wal| {
                txn_id = tracker.begin(wal.next_transaction_id())?;
                Ok(())
            })?;
            println!("Started new transaction {}", txn_id);
            Ok(())
        }

        Commands::TxWrite { key, value } => {
            let txn_id = active_txn(&tracker, "use 'begin-tx' first")?;
            with_wal(config, |wal| {
                let sequence = wal.write(txn_id, key.as_bytes(), value.as_bytes())?;
                wal.sync()?;
                println!(
                    "Wrote record: LSN={}, TxID={}, key={}, value={}",
                    sequence, txn_id, key, value
                );
                Ok(())
            })
        }

        Commands::Commit => {
            let txn_id = active_txn(&tracker, "nothing to commit")?;
            match with_wal(config, |wal| wal.commit(txn_id)) {
                Ok(()) => println!("Committed transaction {}", txn_id),
                Err(WalError::InvalidOrInactiveTransaction(_)) => {
                    // No write ever reached the log, so there is nothing to commit.
                    println!("Transaction {} has no logged writes; nothing to commit", txn_id);
                }
                Err(e) => return Err(e),
            }
            tracker.end(txn_id, true)
        }

        Commands::Abort => {
            let txn_id = active_txn(&tracker, "nothing to abort")?;
            match with_wal(config, |wal| wal.abort(txn_id)) {
                Ok(()) => println!("Aborted transaction {}", txn_id),
                Err(WalError::InvalidOrInactiveTransaction(_)) => {
                    println!("Transaction {} has no logged writes; discarded", txn_id);
                }
                Err(e) => return Err(e),
            }
            tracker.end(txn_id, false)
        }

        Commands::Status => with_wal(config, |wal| {
            let report = wal.recovery_report();
            println!("Directory:            {}", wal.dir().display());
            println!("Active segment:       {}", wal.current_segment());
            println!("Records scanned:      {}", report.records_scanned);
            println!("Last sequence:        {}", wal.last_sequence());
            println!("Next transaction id:  {}", wal.next_transaction_id());
            println!("Unresolved txns:      {:?}", wal.active_transactions());
            if let Some((segment, offset)) = report.truncated_at {
                println!("Truncated at:         segment {} offset {}", segment, offset);
            }
            match tracker.active()? {
                Some(id) => println!("CLI transaction:      {}", id),
                None => println!("CLI transaction:      none"),
            }
            Ok(())
        }),
    }
}

/// Open the WAL, run `f`, and close it whatever `f` returned
fn with_wal<F>(config: Config, f: F) -> wald::Result<()>
where
    F: FnOnce(&Wal) -> wald::Result<()>,
{
    let wal = Wal::open(config)?;
    let result = f(&wal);
    let closed = wal.close();
    result.and(closed)
}

fn active_txn(tracker: &TxnTracker, hint: &str) -> wald::Result<u64> {
    tracker
        .active()?
        .ok_or_else(|| WalError::Tracker(format!("no active transaction - {}", hint)))
}
