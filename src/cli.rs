//! Command-line interface for the DEX block indexer.
//!
//! # Commands
//!
//! - `run`: Index blocks from the start height until Ctrl-C or the end block
//! - `status`: Show the persisted watermark and row counts
//!
//! # Example
//!
//! ```bash
//! # Follow the chain from the stored watermark
//! dex-block-indexer run
//!
//! # Bounded backfill, printing one line per block
//! dex-block-indexer run --start-block 20000000 --end-block 20000100 --print
//!
//! # Inspect the database
//! dex-block-indexer status
//! ```

use crate::config::Config;
use crate::db::{create_pool, Repository};
use crate::error::IndexerResult;
use crate::pipeline::Pipeline;
use crate::publisher::BlockMessage;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// DEX block indexer
#[derive(Parser, Debug)]
#[command(name = "dex-block-indexer")]
#[command(about = "Concurrent, height-ordered DEX event indexer", long_about = None)]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Index blocks until Ctrl-C or the end block
    Run {
        /// First block to index (default: watermark, then chain head)
        #[arg(short, long)]
        start_block: Option<u64>,

        /// Last block to index (default: follow the head forever)
        #[arg(short, long)]
        end_block: Option<u64>,

        /// Let blocks reach the sinks in completion order
        #[arg(long)]
        no_sequencer: bool,

        /// Print a summary line for every committed block
        #[arg(short, long)]
        print: bool,
    },

    /// Show the persisted watermark and row counts
    Status,
}

/// Parse CLI arguments and execute the appropriate command.
///
/// # Errors
///
/// Returns configuration, setup and fatal pipeline errors.
pub async fn run() -> IndexerResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            start_block,
            end_block,
            no_sequencer,
            print,
        } => run_indexer(start_block, end_block, no_sequencer, print).await,
        Commands::Status => run_status_command().await,
    }
}

/// Execute the run command.
async fn run_indexer(
    start_block: Option<u64>,
    end_block: Option<u64>,
    no_sequencer: bool,
    print: bool,
) -> IndexerResult<()> {
    let mut config = Config::from_env()?
        .with_start_block(start_block)
        .with_end_block(end_block);
    if no_sequencer {
        config = config.with_sequencer(false);
    }

    println!("{}", "🔍 Indexing DEX events...".cyan().bold());
    let pipeline = Pipeline::new(config);
    let printer = print.then(|| tokio::spawn(print_blocks(pipeline.publisher().subscribe())));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, draining pipeline");
            println!();
            println!("{}", "🛑 Shutting down gracefully...".yellow().bold());
            signal.cancel();
        }
    });

    let outcome = pipeline.run(shutdown).await;
    drop(pipeline);
    if let Some(printer) = printer {
        join_printer(printer).await;
    }

    let last = outcome?;
    match last {
        Some(block) => println!("{} Last committed block: {}", "📍".cyan(), block.to_string().yellow()),
        None => println!("{}", "No block committed".yellow()),
    }
    println!("{}", "👋 Shutdown complete".green().bold());
    Ok(())
}

/// Execute the status command.
async fn run_status_command() -> IndexerResult<()> {
    let config = Config::from_env()?;
    let repository = Repository::new(create_pool(config.database_url()).await?);
    repository.health_check().await?;
    let stats = repository.stats().await?;

    println!("{} {}", "Database:".bold(), config.database_url());
    println!(
        "{} {}",
        "Finished block:".bold(),
        stats
            .finished_block
            .map_or_else(|| "none".dimmed().to_string(), |b| b.to_string().yellow().to_string())
    );
    println!("{} {}", "Tokens:".bold(), stats.token_count.to_string().blue());
    println!("{} {}", "Pairs:".bold(), stats.pair_count.to_string().blue());
    println!(
        "{} {}",
        "Transactions:".bold(),
        stats.transaction_count.to_string().magenta()
    );
    Ok(())
}

/// Print committed blocks until the bus closes.
async fn print_blocks(mut messages: broadcast::Receiver<Arc<BlockMessage>>) {
    loop {
        match messages.recv().await {
            Ok(message) => println!("{}", format_block_line(&message)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Printer lagged behind, messages skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for the printer to finish. Returns `false` if it panicked or was
/// cancelled.
async fn join_printer(printer: JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Block printer task failed");
            false
        }
    }
}

/// One colored summary line per block.
fn format_block_line(message: &BlockMessage) -> String {
    let events: usize = message.txs.iter().map(|tx| tx.events.len()).sum();
    let timestamp = message.timestamp.format("%Y-%m-%d %H:%M:%S");

    let mut line = format!(
        "{} {} Block: {} | ETH: {} | txs: {} | events: {}",
        "📊".cyan(),
        timestamp.to_string().dimmed(),
        message.block_number.to_string().yellow(),
        format!("${:.2}", message.native_price).white().bold(),
        message.txs.len().to_string().blue(),
        events.to_string().magenta()
    );
    if !message.new_pairs.is_empty() || !message.new_tokens.is_empty() {
        line.push_str(&format!(
            " | {}",
            format!(
                "+{} pairs +{} tokens",
                message.new_pairs.len(),
                message.new_tokens.len()
            )
            .green()
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockResult;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["dex-block-indexer", "run"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from(["dex-block-indexer", "status"]);
        assert!(matches!(cli, Ok(Cli { command: Commands::Status })));

        assert!(Cli::try_parse_from(["dex-block-indexer", "watch"]).is_err());
    }

    #[tokio::test]
    async fn test_printer_stops_when_bus_closes() {
        let (sender, receiver) = broadcast::channel(4);
        let printer = tokio::spawn(print_blocks(receiver));
        drop(sender);
        assert!(join_printer(printer).await);
    }

    #[tokio::test]
    async fn test_failed_printer_is_reported() {
        let printer = tokio::spawn(std::future::pending::<()>());
        printer.abort();
        assert!(!join_printer(printer).await);
    }

    #[test]
    fn test_run_command_flags() {
        let cli = Cli::try_parse_from([
            "dex-block-indexer",
            "run",
            "--start-block",
            "100",
            "--end-block",
            "200",
            "--no-sequencer",
            "--print",
        ]);

        assert!(matches!(
            cli,
            Ok(Cli {
                command: Commands::Run {
                    start_block: Some(100),
                    end_block: Some(200),
                    no_sequencer: true,
                    print: true,
                },
            })
        ));
    }

    #[test]
    fn test_format_block_line() {
        colored::control::set_override(false);
        let message = BlockMessage::from(&BlockResult::new(123, 1_700_000_000, 2512.345));
        let line = format_block_line(&message);

        assert!(line.contains("Block: 123"));
        assert!(line.contains("$2512.35"));
        assert!(line.contains("events: 0"));
        assert!(!line.contains("pairs"));
    }
}
