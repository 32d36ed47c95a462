use std::path::PathBuf;

use thiserror::Error;

/// Domain failures of the load and index pipeline.
///
/// Downstream I/O failures (SQLite, filesystem) are not listed here; they travel
/// as `anyhow` errors with context attached at the call site.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("dataset directory not found: {}", .0.display())]
    MissingSourceDirectory(PathBuf),

    #[error("no CSV files found in {}", .0.display())]
    NoSources(PathBuf),

    #[error("database not found at {}; run `load` first", .0.display())]
    MissingDatabase(PathBuf),

    #[error("{} is empty", .0.display())]
    EmptySource(PathBuf),

    #[error(
        "row length mismatch in {} at row {row}: expected {expected} values but found {found}",
        path.display()
    )]
    RowShape {
        path: PathBuf,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error(
        "headers '{first}' and '{second}' in {} both normalize to column '{column}'",
        path.display()
    )]
    DuplicateColumn {
        path: PathBuf,
        column: String,
        first: String,
        second: String,
    },

    #[error(
        "{} maps to reserved table name '{table}'; rename the file",
        path.display()
    )]
    ReservedTableName { path: PathBuf, table: String },

    #[error("table(s) not found in database: {}", .0.join(", "))]
    TableNotFound(Vec<String>),
}
