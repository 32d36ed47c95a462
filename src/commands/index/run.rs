use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cli::IndexArgs;
use crate::config::LanguageConfig;
use crate::error::PipelineError;
use crate::model::{IndexRunManifest, TableIndexEntry};
use crate::semantic::resolve_model_config;
use crate::store::SourceStore;
use crate::util::{default_manifest_dir, now_utc_string, run_id, write_json_pretty};
use crate::vector_index::{VectorIndex, VectorStore};

use super::batcher::{IndexBatcher, VECTOR_BATCH_SIZE};
use super::compose::compose_row_documents;
use super::partition::partition_columns;

pub fn run(args: IndexArgs) -> Result<usize> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = run_id("index", started_ts);

    if !args.db_path.is_file() {
        return Err(PipelineError::MissingDatabase(args.db_path.clone()).into());
    }

    let config = LanguageConfig::load(args.config.as_deref())?;
    let model = resolve_model_config(&args.model_id)?;
    let store = SourceStore::open_existing(&args.db_path)?;
    let tables = resolve_tables(store.list_tables()?, &args.tables)?;

    info!(
        db_path = %args.db_path.display(),
        index_path = %args.index_path.display(),
        collection = %args.collection,
        tables = tables.len(),
        run_id = %run_id,
        "starting index build"
    );

    let mut vector_store = VectorStore::open(&args.index_path)?;
    if args.reset && vector_store.delete_collection(&args.collection)? {
        warn!(collection = %args.collection, "reset dropped existing collection");
    }
    if vector_store.collection_exists(&args.collection)? {
        info!(collection = %args.collection, "upserting into existing collection");
    }
    let mut collection = vector_store.get_or_create_collection(&args.collection, &model)?;

    let entries = index_tables(&store, &tables, &config, &mut collection, VECTOR_BATCH_SIZE)?;
    let total_documents = entries.iter().map(|entry| entry.documents).sum::<usize>();
    let collection_documents = collection.count()?;

    let manifest_dir = args
        .manifest_dir
        .clone()
        .unwrap_or_else(|| default_manifest_dir(&args.index_path));
    let manifest_path = manifest_dir.join(format!("{run_id}.json"));
    let manifest = IndexRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        completed_at: now_utc_string(),
        db_path: args.db_path.display().to_string(),
        index_path: args.index_path.display().to_string(),
        collection: args.collection.clone(),
        model_id: model.model_id.clone(),
        languages: config
            .language_tags()
            .into_iter()
            .map(str::to_string)
            .collect(),
        reset: args.reset,
        requested_tables: args.tables.clone(),
        tables: entries,
        total_documents,
        collection_documents,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote index run manifest");
    info!(
        collection = %args.collection,
        documents = total_documents,
        collection_documents,
        "index build completed"
    );

    Ok(total_documents)
}

/// Picks the tables to index: every available table, or the requested subset
/// kept in lexical order. Unknown names fail together.
pub(crate) fn resolve_tables(
    available: Vec<String>,
    requested: &[String],
) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(available);
    }

    let requested = requested
        .iter()
        .map(String::as_str)
        .collect::<BTreeSet<&str>>();
    let missing = requested
        .iter()
        .filter(|name| !available.iter().any(|table| table == *name))
        .map(|name| name.to_string())
        .collect::<Vec<String>>();
    if !missing.is_empty() {
        return Err(PipelineError::TableNotFound(missing).into());
    }

    Ok(available
        .into_iter()
        .filter(|table| requested.contains(table.as_str()))
        .collect())
}

pub(crate) fn index_tables<I: VectorIndex + ?Sized>(
    store: &SourceStore,
    tables: &[String],
    config: &LanguageConfig,
    index: &mut I,
    batch_size: usize,
) -> Result<Vec<TableIndexEntry>> {
    let mut entries = Vec::with_capacity(tables.len());

    for table in tables {
        let entry = index_table(store, table, config, &mut *index, batch_size)
            .with_context(|| format!("failed to index table {table}"))?;
        info!(
            table = %entry.table_name,
            rows = entry.rows_scanned,
            documents = entry.documents,
            batches = entry.batches,
            "indexed table"
        );
        entries.push(entry);
    }

    Ok(entries)
}

pub(crate) fn index_table<I: VectorIndex + ?Sized>(
    store: &SourceStore,
    table_name: &str,
    config: &LanguageConfig,
    index: &mut I,
    batch_size: usize,
) -> Result<TableIndexEntry> {
    let shape = store.table_shape(table_name)?;
    if let Some(record) = store.provenance(table_name)? {
        debug!(
            table = %table_name,
            source = %record.source_file,
            ingested_at = %record.ingested_at.to_rfc3339(),
            "indexing table"
        );
    }
    let classification = partition_columns(&shape.columns, config);
    let mut batcher = IndexBatcher::new(index, batch_size);

    let rows_scanned = store.scan_rows(&shape, |row| {
        for document in compose_row_documents(&shape, &classification, &row) {
            batcher.add(document)?;
        }
        Ok(())
    })?;
    let stats = batcher.finish()?;

    Ok(TableIndexEntry {
        table_name: shape.name.clone(),
        column_count: shape.column_count(),
        rows_scanned,
        documents: stats.documents,
        batches: stats.flushes,
    })
}
