use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::LoadArgs;
use crate::coerce::ValueCoercer;
use crate::error::PipelineError;
use crate::model::{LoadRunManifest, SourceLoadEntry};
use crate::store::SourceStore;
use crate::util::{
    default_manifest_dir, ensure_parent_directory, now_utc_string, run_id, sha256_file,
    write_json_pretty,
};

use super::loader::ingest_file;

#[derive(Debug, Clone)]
pub(crate) struct LoadSummary {
    pub(crate) tables_dropped: usize,
    pub(crate) sources: Vec<SourceLoadEntry>,
    pub(crate) total_rows: usize,
}

pub fn run(args: LoadArgs) -> Result<usize> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = run_id("load", started_ts);

    info!(
        datasets = %args.datasets.display(),
        db_path = %args.db_path.display(),
        run_id = %run_id,
        "starting load"
    );

    // Directory problems surface before the database file exists.
    let csv_files = gather_csv_files(&args.datasets)?;

    ensure_parent_directory(&args.db_path)?;
    let mut store = SourceStore::open(&args.db_path)?;
    let summary = load_sources(&mut store, &csv_files, args.reset)?;

    let manifest_dir = args
        .manifest_dir
        .clone()
        .unwrap_or_else(|| default_manifest_dir(&args.db_path));
    let manifest_path = manifest_dir.join(format!("{run_id}.json"));
    let manifest = LoadRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        completed_at: now_utc_string(),
        datasets_dir: args.datasets.display().to_string(),
        db_path: args.db_path.display().to_string(),
        reset: args.reset,
        tables_dropped: summary.tables_dropped,
        sources: summary.sources.clone(),
        total_rows: summary.total_rows,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote load run manifest");
    info!(
        sources = summary.sources.len(),
        rows = summary.total_rows,
        db_path = %args.db_path.display(),
        "load completed"
    );

    Ok(summary.total_rows)
}

/// Loads `csv_files` in order, one transaction per source.
pub(crate) fn load_sources(
    store: &mut SourceStore,
    csv_files: &[PathBuf],
    reset: bool,
) -> Result<LoadSummary> {
    let tables_dropped = if reset {
        let dropped = store.reset()?;
        warn!(tables = dropped, "reset dropped previously loaded tables");
        dropped
    } else {
        0
    };

    let coercer = ValueCoercer::new()?;
    let mut sources = Vec::with_capacity(csv_files.len());
    let mut total_rows = 0usize;

    for csv_path in csv_files {
        let sha256 = sha256_file(csv_path)?;
        let loaded = ingest_file(store, csv_path, &coercer)
            .with_context(|| format!("failed to load {}", csv_path.display()))?;

        info!(
            source = %csv_path.display(),
            table = %loaded.table_name,
            columns = loaded.normalized_columns.len(),
            rows = loaded.row_count,
            batches = loaded.batches,
            "loaded source"
        );

        total_rows += loaded.row_count;
        sources.push(SourceLoadEntry {
            source_file: csv_path.display().to_string(),
            table_name: loaded.table_name,
            sha256,
            column_count: loaded.normalized_columns.len(),
            row_count: loaded.row_count,
        });
    }

    Ok(LoadSummary {
        tables_dropped,
        sources,
        total_rows,
    })
}

/// Sorted `*.csv` files (extension matched case-insensitively) in `datasets_dir`.
pub(crate) fn gather_csv_files(datasets_dir: &Path) -> Result<Vec<PathBuf>> {
    if !datasets_dir.is_dir() {
        return Err(PipelineError::MissingSourceDirectory(datasets_dir.to_path_buf()).into());
    }

    let mut csv_files = Vec::new();
    for entry in fs::read_dir(datasets_dir)
        .with_context(|| format!("failed to read directory {}", datasets_dir.display()))?
    {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|extension| extension.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            csv_files.push(path);
        }
    }

    if csv_files.is_empty() {
        return Err(PipelineError::NoSources(datasets_dir.to_path_buf()).into());
    }

    csv_files.sort();
    Ok(csv_files)
}
