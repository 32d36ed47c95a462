use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, Transaction};

use crate::coerce::CellValue;
use crate::ledger::{self, LEDGER_TABLE, ProvenanceRecord};

/// Ordered column list of a dataset table, fixed when the table is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    pub name: String,
    pub columns: Vec<String>,
}

impl TableShape {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// One scanned row; `values[i]` belongs to `TableShape::columns[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub row_id: i64,
    pub values: Vec<CellValue>,
}

/// Relational store holding one table per loaded source plus the ledger.
///
/// Table and column names reaching this type are expected to be outputs of
/// `normalize_identifier`; they are quoted but not otherwise escaped.
pub struct SourceStore {
    connection: Connection,
}

impl SourceStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        Self::from_connection(connection)
    }

    pub fn open_existing(db_path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open {}", db_path.display()))?;
        Self::from_connection(connection)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        configure_connection(&connection)?;
        ledger::ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.connection
            .transaction()
            .context("failed to begin store transaction")
    }

    /// Dataset tables in lexical order, excluding the ledger and SQLite internals.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut statement = self.connection.prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != ?1
            ORDER BY name ASC
            ",
        )?;

        let names = statement
            .query_map([LEDGER_TABLE], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn table_shape(&self, table_name: &str) -> Result<TableShape> {
        let mut statement = self
            .connection
            .prepare(&format!("PRAGMA table_info(\"{table_name}\")"))
            .with_context(|| format!("failed to inspect schema for table {table_name}"))?;

        let columns = statement
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(TableShape {
            name: table_name.to_string(),
            columns,
        })
    }

    /// Visits every row of `shape` in rowid order.
    pub fn scan_rows<F>(&self, shape: &TableShape, mut visit: F) -> Result<usize>
    where
        F: FnMut(StoredRow) -> Result<()>,
    {
        let select_clause = shape
            .columns
            .iter()
            .map(|column| format!("\"{column}\""))
            .collect::<Vec<String>>()
            .join(", ");
        let sql = if select_clause.is_empty() {
            format!("SELECT rowid FROM \"{}\" ORDER BY rowid", shape.name)
        } else {
            format!(
                "SELECT rowid, {select_clause} FROM \"{}\" ORDER BY rowid",
                shape.name
            )
        };

        let mut statement = self
            .connection
            .prepare(&sql)
            .with_context(|| format!("failed to scan table {}", shape.name))?;
        let mut rows = statement.query([])?;
        let mut visited = 0usize;

        while let Some(row) = rows.next()? {
            let row_id: i64 = row.get(0)?;
            let mut values = Vec::with_capacity(shape.column_count());
            for index in 0..shape.column_count() {
                values.push(CellValue::from_value_ref(row.get_ref(index + 1)?));
            }
            visit(StoredRow { row_id, values })?;
            visited += 1;
        }

        Ok(visited)
    }

    pub fn provenance(&self, table_name: &str) -> Result<Option<ProvenanceRecord>> {
        ledger::find(&self.connection, table_name)
    }

    pub fn provenance_records(&self) -> Result<Vec<ProvenanceRecord>> {
        ledger::list(&self.connection)
    }

    /// Drops every dataset table and empties the ledger.
    pub fn reset(&mut self) -> Result<usize> {
        let tables = self.list_tables()?;
        let tx = self.transaction()?;
        for table in &tables {
            tx.execute(&format!("DROP TABLE IF EXISTS \"{table}\""), [])
                .with_context(|| format!("failed to drop table {table}"))?;
        }
        tx.execute(&format!("DELETE FROM {LEDGER_TABLE}"), [])?;
        tx.commit()?;
        Ok(tables.len())
    }

    pub fn count_rows(&self, table_name: &str) -> Result<i64> {
        let count = self.connection.query_row(
            &format!("SELECT COUNT(*) FROM \"{table_name}\""),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

/// Drops `table_name` if present and recreates it with one TEXT column per entry.
pub fn replace_table(tx: &Transaction<'_>, table_name: &str, columns: &[String]) -> Result<()> {
    tx.execute(&format!("DROP TABLE IF EXISTS \"{table_name}\""), [])
        .with_context(|| format!("failed to drop table {table_name}"))?;

    let schema_columns = columns
        .iter()
        .map(|column| format!("\"{column}\" TEXT"))
        .collect::<Vec<String>>()
        .join(", ");
    tx.execute(
        &format!("CREATE TABLE \"{table_name}\" ({schema_columns})"),
        [],
    )
    .with_context(|| format!("failed to create table {table_name}"))?;

    Ok(())
}

pub fn insert_rows(
    tx: &Transaction<'_>,
    table_name: &str,
    columns: &[String],
    rows: &[Vec<CellValue>],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let column_list = columns
        .iter()
        .map(|column| format!("\"{column}\""))
        .collect::<Vec<String>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<String>>()
        .join(", ");

    let mut statement = tx.prepare_cached(&format!(
        "INSERT INTO \"{table_name}\" ({column_list}) VALUES ({placeholders})"
    ))?;

    for row in rows {
        statement
            .execute(rusqlite::params_from_iter(row.iter()))
            .with_context(|| format!("failed to insert row into {table_name}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_tables_skips_ledger_and_sorts_names() {
        let mut store = SourceStore::open_in_memory().unwrap();
        let tx = store.transaction().unwrap();
        replace_table(&tx, "zeta", &["a".to_string()]).unwrap();
        replace_table(&tx, "alpha", &["b".to_string()]).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.list_tables().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn replace_table_discards_previous_rows() {
        let mut store = SourceStore::open_in_memory().unwrap();
        let columns = vec!["service_id".to_string()];
        let tx = store.transaction().unwrap();
        replace_table(&tx, "service", &columns).unwrap();
        insert_rows(&tx, "service", &columns, &[vec![CellValue::Integer(1)]]).unwrap();
        replace_table(&tx, "service", &columns).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.count_rows("service").unwrap(), 0);
    }

    #[test]
    fn scan_rows_exposes_rowid_and_values_in_column_order() {
        let mut store = SourceStore::open_in_memory().unwrap();
        let columns = vec!["service_id".to_string(), "name_en".to_string()];
        let tx = store.transaction().unwrap();
        replace_table(&tx, "service", &columns).unwrap();
        insert_rows(
            &tx,
            "service",
            &columns,
            &[
                vec![CellValue::Integer(1), CellValue::Text("Passport".to_string())],
                vec![CellValue::Integer(2), CellValue::Null],
            ],
        )
        .unwrap();
        tx.commit().unwrap();

        let shape = store.table_shape("service").unwrap();
        assert_eq!(shape.columns, columns);

        let mut rows = Vec::new();
        let visited = store
            .scan_rows(&shape, |row| {
                rows.push(row);
                Ok(())
            })
            .unwrap();

        assert_eq!(visited, 2);
        assert_eq!(rows[0].row_id, 1);
        assert_eq!(rows[0].values[0].clean_text().as_deref(), Some("1"));
        assert_eq!(rows[0].values[1].clean_text().as_deref(), Some("Passport"));
        assert_eq!(rows[1].row_id, 2);
        assert_eq!(rows[1].values[1], CellValue::Null);
    }

    #[test]
    fn reset_drops_tables_and_ledger_rows() {
        let mut store = SourceStore::open_in_memory().unwrap();
        let tx = store.transaction().unwrap();
        replace_table(&tx, "service", &["service_id".to_string()]).unwrap();
        ledger::upsert(
            &tx,
            &ProvenanceRecord {
                table_name: "service".to_string(),
                source_file: "datasets/service.csv".to_string(),
                row_count: 0,
                original_columns: vec!["Service ID".to_string()],
                normalized_columns: vec!["service_id".to_string()],
                ingested_at: chrono::Utc::now(),
            },
        )
        .unwrap();
        tx.commit().unwrap();

        assert_eq!(store.reset().unwrap(), 1);
        assert!(store.list_tables().unwrap().is_empty());
        assert!(store.provenance("service").unwrap().is_none());
    }
}
