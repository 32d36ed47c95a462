use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use csv::{ReaderBuilder, StringRecord};
use rusqlite::Transaction;
use tracing::debug;

use crate::coerce::{CellValue, ValueCoercer};
use crate::error::PipelineError;
use crate::identifier::normalize_identifier;
use crate::ledger::{self, LEDGER_TABLE, ProvenanceRecord};
use crate::store::{SourceStore, insert_rows, replace_table};

pub(crate) const INSERT_BATCH_SIZE: usize = 500;

const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadedTable {
    pub(crate) table_name: String,
    pub(crate) original_columns: Vec<String>,
    pub(crate) normalized_columns: Vec<String>,
    pub(crate) row_count: usize,
    pub(crate) batches: usize,
}

/// Loads one CSV file into its table and records provenance, all inside one
/// transaction. On failure nothing of this source is committed and any
/// previous version of the table survives.
pub(crate) fn ingest_file(
    store: &mut SourceStore,
    csv_path: &Path,
    coercer: &ValueCoercer,
) -> Result<LoadedTable> {
    let table_name = table_name_for(csv_path);
    if is_reserved_table_name(&table_name) {
        return Err(PipelineError::ReservedTableName {
            path: csv_path.to_path_buf(),
            table: table_name,
        }
        .into());
    }

    let file = File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    let tx = store.transaction()?;
    let loaded = load_table(&tx, file, csv_path, &table_name, coercer)?;

    ledger::upsert(
        &tx,
        &ProvenanceRecord {
            table_name: loaded.table_name.clone(),
            source_file: csv_path.display().to_string(),
            row_count: loaded.row_count,
            original_columns: loaded.original_columns.clone(),
            normalized_columns: loaded.normalized_columns.clone(),
            ingested_at: Utc::now(),
        },
    )?;

    tx.commit()
        .with_context(|| format!("failed to commit table {table_name}"))?;
    Ok(loaded)
}

pub(crate) fn table_name_for(csv_path: &Path) -> String {
    let stem = csv_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    normalize_identifier(&stem)
}

/// The ledger and SQLite's internal tables cannot be overwritten by a source.
pub(crate) fn is_reserved_table_name(table_name: &str) -> bool {
    table_name == LEDGER_TABLE || table_name.starts_with("sqlite_")
}

/// Replaces `table_name` with the rows read from `input`.
///
/// `source` only labels errors. Rows are flushed every `INSERT_BATCH_SIZE`
/// accepted rows and once more after the last one.
pub(crate) fn load_table<R: Read>(
    tx: &Transaction<'_>,
    input: R,
    source: &Path,
    table_name: &str,
    coercer: &ValueCoercer,
) -> Result<LoadedTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record
            .with_context(|| format!("failed to read header of {}", source.display()))?,
        None => return Err(PipelineError::EmptySource(source.to_path_buf()).into()),
    };

    let original_columns = header
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            if index == 0 {
                cell.trim_start_matches(BYTE_ORDER_MARK).to_string()
            } else {
                cell.to_string()
            }
        })
        .collect::<Vec<String>>();
    let normalized_columns = normalize_headers(&original_columns, source)?;

    replace_table(tx, table_name, &normalized_columns)?;

    let mut batch = Vec::<Vec<CellValue>>::with_capacity(INSERT_BATCH_SIZE);
    let mut row_count = 0usize;
    let mut batches = 0usize;
    let mut record_number = 1usize;

    for record in records {
        let record =
            record.with_context(|| format!("failed to read record in {}", source.display()))?;
        record_number += 1;

        if is_blank(&record) {
            continue;
        }

        if record.len() != original_columns.len() {
            let row = record
                .position()
                .map(|position| position.line() as usize)
                .unwrap_or(record_number);
            return Err(PipelineError::RowShape {
                path: source.to_path_buf(),
                row,
                expected: original_columns.len(),
                found: record.len(),
            }
            .into());
        }

        batch.push(record.iter().map(|cell| coercer.coerce(Some(cell))).collect());
        row_count += 1;

        if batch.len() >= INSERT_BATCH_SIZE {
            insert_rows(tx, table_name, &normalized_columns, &batch)?;
            batches += 1;
            debug!(table = %table_name, rows = row_count, "flushed insert batch");
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_rows(tx, table_name, &normalized_columns, &batch)?;
        batches += 1;
    }

    Ok(LoadedTable {
        table_name: table_name.to_string(),
        original_columns,
        normalized_columns,
        row_count,
        batches,
    })
}

/// Normalizes every header independently and rejects collisions.
fn normalize_headers(original_columns: &[String], source: &Path) -> Result<Vec<String>> {
    let mut seen = HashMap::<String, usize>::new();
    let mut normalized_columns = Vec::with_capacity(original_columns.len());

    for (index, original) in original_columns.iter().enumerate() {
        let normalized = normalize_identifier(original);
        if let Some(first_index) = seen.insert(normalized.clone(), index) {
            return Err(PipelineError::DuplicateColumn {
                path: source.to_path_buf(),
                column: normalized,
                first: original_columns[first_index].clone(),
                second: original.clone(),
            }
            .into());
        }
        normalized_columns.push(normalized);
    }

    Ok(normalized_columns)
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}
