//! Arguments and setup shared by the Floe binaries.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use floe::{Compression, Config, FloeError, Result, Schema, StoreConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Blob store and row layout options
#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Store endpoint: memory://, file:///path or a directory
    #[arg(long, env = "FLOE_STORE_ENDPOINT", default_value = "./floe_data")]
    pub endpoint: String,

    /// Storage account
    #[arg(long, env = "FLOE_STORE_ACCOUNT")]
    pub account: String,

    /// Storage account access key
    #[arg(long, env = "FLOE_STORE_KEY", hide_env_values = true)]
    pub access_key: String,

    /// Container holding all partitions
    #[arg(short, long, default_value = "floe")]
    pub container: String,

    /// Column routing rows to partitions
    #[arg(long, default_value = "id")]
    pub partition_column: String,

    /// Column defining block key ranges
    #[arg(short, long, default_value = "ts")]
    pub key_column: String,

    /// Container compression: null, lz4 or zstd
    #[arg(long, default_value = "null")]
    pub compression: String,

    /// JSON schema file (defaults to accepting any row)
    #[arg(long)]
    pub schema: Option<PathBuf>,
}

impl StoreArgs {
    /// Builder pre-filled with the store and layout options
    pub fn config_builder(&self) -> Result<floe::config::ConfigBuilder> {
        let compression: Compression = self.compression.parse()?;
        Ok(Config::builder()
            .partition_column(&self.partition_column)
            .key_column(&self.key_column)
            .compression(compression)
            .store(StoreConfig {
                endpoint: self.endpoint.clone(),
                account: self.account.clone(),
                access_key: self.access_key.clone(),
                container: self.container.clone(),
            }))
    }

    pub fn load_schema(&self) -> Result<Schema> {
        match &self.schema {
            None => Ok(Schema::open("floe.Row")),
            Some(path) => {
                let text = fs::read_to_string(path)?;
                serde_json::from_str(&text).map_err(|e| {
                    FloeError::Config(format!("invalid schema file {}: {}", path.display(), e))
                })
            }
        }
    }
}

/// Install the tracing subscriber (`RUST_LOG` overrides the default filter)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,floe=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();
}
