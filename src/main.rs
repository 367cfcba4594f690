//! CLI entry point for the DEX block indexer.
//!
//! ```text
//! main.rs (runtime + tracing)
//!     ↓
//! cli::run()
//!     ↓
//! Pipeline: heads → dispatch → fetch → parse → commit (SQLite, file, bus)
//! ```
//!
//! Any error reaching `main` (configuration, setup, sink failure, sequencing
//! violation) terminates the process with status 1.

use dex_block_indexer::{cli, observability};
use tracing::error;

#[tokio::main]
async fn main() {
    // Logging first. RUST_LOG, LOG_JSON and LOG_FILE control the output:
    //   RUST_LOG=dex_block_indexer=debug,sqlx=warn cargo run -- run
    //   LOG_JSON=true LOG_FILE=./logs/indexer.log cargo run -- run
    let log_level = std::env::var("RUST_LOG").ok();
    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let json_output = std::env::var("LOG_JSON")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let guard = match observability::init_tracing(log_level, log_file, json_output) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::run().await {
        error!(error = %e, chain = %e.chain_string(), "Application error");
        eprintln!("Error: {e}");
        drop(guard);
        std::process::exit(1);
    }
}
