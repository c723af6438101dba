//! Floe Ingest Binary
//!
//! Reads newline-delimited JSON rows and ingests them into a blob store.
//! With `--container`, replays rows from stored block containers instead.

mod common;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use clap::Parser;
use crossbeam::channel::Sender;
use floe::codec;
use floe::row::row_from_json;
use floe::{Engine, Result, Row};

use common::StoreArgs;

/// Floe Ingest
#[derive(Parser, Debug)]
#[command(name = "floe-ingest")]
#[command(about = "Ingest NDJSON rows into partitioned, range-named blocks")]
#[command(version)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    /// Input file (defaults to stdin)
    #[arg(short, long, conflicts_with = "container")]
    input: Option<PathBuf>,

    /// Block container file to replay (repeatable)
    #[arg(long)]
    container: Vec<PathBuf>,

    /// Commit a block once it holds this many rows
    #[arg(long, default_value = "10000")]
    max_size: usize,

    /// Commit a block once it is this old (milliseconds)
    #[arg(long, default_value = "60000")]
    max_age_ms: u64,
}

fn main() {
    common::init_tracing();

    let args = Args::parse();

    tracing::info!("Floe Ingest v{}", floe::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("Ingest failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = args
        .store
        .config_builder()?
        .max_size(args.max_size)
        .max_age_ms(args.max_age_ms)
        .build();
    let schema = args.store.load_schema()?;

    let engine = Engine::open(config, schema)?;
    let rows = engine.sender()?;

    let fed = if args.container.is_empty() {
        ingest_ndjson(args.input.as_ref(), &rows)
    } else {
        replay_containers(&args.container, &rows)
    };
    drop(rows);

    let result = engine.close();
    fed.and(result)
}

fn ingest_ndjson(input: Option<&PathBuf>, rows: &Sender<Row>) -> Result<()> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => {
            tracing::info!("Reading rows from {}", path.display());
            Box::new(BufReader::new(File::open(path)?))
        }
        None => {
            tracing::info!("Reading rows from stdin");
            Box::new(BufReader::new(io::stdin()))
        }
    };

    let mut sent = 0u64;
    let mut skipped = 0u64;
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let parsed = serde_json::from_str(&line)
            .map_err(|e| floe::FloeError::Serialization(e.to_string()))
            .and_then(row_from_json);
        match parsed {
            Ok(row) => {
                if rows.send(row).is_err() {
                    tracing::error!("Block manager stopped; aborting at line {}", number + 1);
                    break;
                }
                sent += 1;
            }
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", number + 1, e);
                skipped += 1;
            }
        }
    }

    tracing::info!("Ingest finished: {} rows sent, {} lines skipped", sent, skipped);
    Ok(())
}

fn replay_containers(paths: &[PathBuf], rows: &Sender<Row>) -> Result<()> {
    let mut total = 0;
    for path in paths {
        tracing::info!("Replaying container {}", path.display());
        let sent = codec::read_container_into(BufReader::new(File::open(path)?), rows)?;
        tracing::debug!("{} rows replayed from {}", sent, path.display());
        total += sent;
    }

    tracing::info!("Replay finished: {} rows from {} containers", total, paths.len());
    Ok(())
}
