use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_DB_PATH: &str = "data/processed/datasets.sqlite";
pub const DEFAULT_INDEX_PATH: &str = "data/vectorstore/index.sqlite";
pub const DEFAULT_COLLECTION: &str = "accessible_services";

#[derive(Parser, Debug)]
#[command(
    name = "tabindex",
    version,
    about = "Load CSV datasets into SQLite and build a language-partitioned semantic index"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Load(LoadArgs),
    Index(IndexArgs),
    Search(SearchArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// Directory scanned for `*.csv` sources.
    #[arg(long, default_value = "datasets")]
    pub datasets: PathBuf,

    #[arg(long, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    /// Directory receiving the JSON run manifest. Defaults to `manifests/` next to the database.
    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    /// Drop every previously loaded table and ledger row before loading.
    #[arg(long, default_value_t = false)]
    pub reset: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, default_value = DEFAULT_INDEX_PATH)]
    pub index_path: PathBuf,

    #[arg(long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    #[arg(long, default_value = crate::semantic::DEFAULT_MODEL_ID)]
    pub model_id: String,

    /// Restrict indexing to these tables. Every name must exist.
    #[arg(long = "table")]
    pub tables: Vec<String>,

    /// JSON file describing the language suffix map.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    /// Drop the collection before indexing.
    #[arg(long, default_value_t = false)]
    pub reset: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[arg(long, default_value = DEFAULT_INDEX_PATH)]
    pub index_path: PathBuf,

    #[arg(long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    #[arg(long)]
    pub query: String,

    #[arg(long)]
    pub language: Option<String>,

    #[arg(long, default_value_t = 5)]
    pub limit: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, default_value = DEFAULT_INDEX_PATH)]
    pub index_path: PathBuf,

    #[arg(long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,
}
