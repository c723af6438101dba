//! Floe Query Binary
//!
//! Runs a key-range query against one partition and prints the matching
//! rows as JSON lines.

mod common;

use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use floe::row::row_to_json;
use floe::{FloeError, KeyValue, Result, Row, RowCodec, StorageAdapter};

use common::StoreArgs;

/// Floe Query
#[derive(Parser, Debug)]
#[command(name = "floe-query")]
#[command(about = "Query a partition for rows within a key range")]
#[command(version)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    /// Partition key
    partition: String,

    /// Inclusive lower bound of the key column
    start: String,

    /// Inclusive upper bound of the key column
    end: String,

    /// Compare keys as strings instead of integers
    #[arg(long)]
    string_keys: bool,

    /// Give up after this long (milliseconds, 0 = never)
    #[arg(long, default_value = "0")]
    timeout_ms: u64,
}

fn main() {
    common::init_tracing();

    let args = Args::parse();

    match run(args) {
        Ok(count) => tracing::info!("{} rows", count),
        Err(e) => {
            // Whatever was fetched before the failure is still printed
            if let Err(print_err) = print_rows(e.partial_rows()) {
                tracing::error!("Failed to print partial rows: {}", print_err);
            }
            tracing::error!("Query failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<usize> {
    let (start, end) = parse_bounds(&args)?;

    let config = args
        .store
        .config_builder()?
        .fetch_timeout_ms(args.timeout_ms)
        .build();
    let schema = args.store.load_schema()?;
    let codec = Arc::new(RowCodec::new(schema, config.compression));

    let mut adapter = StorageAdapter::new(config, codec);
    adapter.connect()?;

    let rows = adapter.query(&args.partition, &start, &end)?;
    print_rows(&rows)?;

    let stats = adapter.stats();
    tracing::debug!(
        "{} blocks pruned, {} fetched",
        stats.blocks_pruned,
        stats.blocks_fetched
    );
    Ok(rows.len())
}

fn parse_bounds(args: &Args) -> Result<(KeyValue, KeyValue)> {
    if args.string_keys {
        return Ok((
            KeyValue::from(args.start.as_str()),
            KeyValue::from(args.end.as_str()),
        ));
    }

    let parse = |s: &str| {
        s.parse::<i64>()
            .map(KeyValue::Integer)
            .map_err(|_| FloeError::KeyType(format!("'{}' is not an integer key (use --string-keys)", s)))
    };
    Ok((parse(&args.start)?, parse(&args.end)?))
}

fn print_rows(rows: &[Row]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for row in rows {
        let line = serde_json::to_string(&row_to_json(row))
            .map_err(|e| FloeError::Serialization(e.to_string()))?;
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}
