use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

/// Name of the provenance ledger table; never treated as a dataset.
pub const LEDGER_TABLE: &str = "data_sources";

/// How and when one dataset table was produced.
///
/// `normalized_columns[i]` is always the normalization of `original_columns[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceRecord {
    pub table_name: String,
    pub source_file: String,
    pub row_count: usize,
    pub original_columns: Vec<String>,
    pub normalized_columns: Vec<String>,
    pub ingested_at: DateTime<Utc>,
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
              table_name TEXT PRIMARY KEY,
              source_file TEXT NOT NULL,
              row_count INTEGER NOT NULL,
              original_columns TEXT NOT NULL,
              normalized_columns TEXT NOT NULL,
              ingested_at TEXT NOT NULL
            );
            "
        ))
        .context("failed to initialize provenance ledger")?;
    Ok(())
}

/// Inserts or replaces the record keyed on `record.table_name`.
pub fn upsert(connection: &Connection, record: &ProvenanceRecord) -> Result<()> {
    let original_columns = serde_json::to_string(&record.original_columns)?;
    let normalized_columns = serde_json::to_string(&record.normalized_columns)?;

    connection
        .execute(
            &format!(
                "
                INSERT INTO {LEDGER_TABLE}(table_name, source_file, row_count, original_columns, normalized_columns, ingested_at)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(table_name) DO UPDATE SET
                  source_file=excluded.source_file,
                  row_count=excluded.row_count,
                  original_columns=excluded.original_columns,
                  normalized_columns=excluded.normalized_columns,
                  ingested_at=excluded.ingested_at
                "
            ),
            params![
                record.table_name,
                record.source_file,
                record.row_count as i64,
                original_columns,
                normalized_columns,
                record.ingested_at,
            ],
        )
        .with_context(|| format!("failed to record provenance for {}", record.table_name))?;

    Ok(())
}

pub fn find(connection: &Connection, table_name: &str) -> Result<Option<ProvenanceRecord>> {
    let raw = connection
        .query_row(
            &format!(
                "
                SELECT table_name, source_file, row_count, original_columns, normalized_columns, ingested_at
                FROM {LEDGER_TABLE}
                WHERE table_name = ?1
                "
            ),
            [table_name],
            read_raw_record,
        )
        .optional()?;

    raw.map(RawRecord::decode).transpose()
}

pub fn list(connection: &Connection) -> Result<Vec<ProvenanceRecord>> {
    let mut statement = connection.prepare(&format!(
        "
        SELECT table_name, source_file, row_count, original_columns, normalized_columns, ingested_at
        FROM {LEDGER_TABLE}
        ORDER BY table_name ASC
        "
    ))?;

    let raw = statement
        .query_map([], read_raw_record)?
        .collect::<rusqlite::Result<Vec<RawRecord>>>()?;
    raw.into_iter().map(RawRecord::decode).collect()
}

struct RawRecord {
    table_name: String,
    source_file: String,
    row_count: i64,
    original_columns: String,
    normalized_columns: String,
    ingested_at: DateTime<Utc>,
}

impl RawRecord {
    fn decode(self) -> Result<ProvenanceRecord> {
        let original_columns = serde_json::from_str::<Vec<String>>(&self.original_columns)
            .with_context(|| format!("failed to parse original_columns for {}", self.table_name))?;
        let normalized_columns = serde_json::from_str::<Vec<String>>(&self.normalized_columns)
            .with_context(|| {
                format!("failed to parse normalized_columns for {}", self.table_name)
            })?;

        Ok(ProvenanceRecord {
            table_name: self.table_name,
            source_file: self.source_file,
            row_count: self.row_count.max(0) as usize,
            original_columns,
            normalized_columns,
            ingested_at: self.ingested_at,
        })
    }
}

fn read_raw_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        table_name: row.get(0)?,
        source_file: row.get(1)?,
        row_count: row.get(2)?,
        original_columns: row.get(3)?,
        normalized_columns: row.get(4)?,
        ingested_at: row.get(5)?,
    })
}
