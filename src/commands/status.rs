use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::SourceStore;
use crate::vector_index::VectorStore;

pub fn run(args: StatusArgs) -> Result<()> {
    info!(
        db_path = %args.db_path.display(),
        index_path = %args.index_path.display(),
        "status requested"
    );

    if args.db_path.is_file() {
        let store = SourceStore::open_existing(&args.db_path)?;
        let tables = store.list_tables()?;
        let records = store.provenance_records()?;

        info!(
            path = %args.db_path.display(),
            tables = tables.len(),
            ledger_records = records.len(),
            "database status"
        );

        for record in &records {
            let stored_rows = store.count_rows(&record.table_name).unwrap_or(-1);
            info!(
                table = %record.table_name,
                source = %record.source_file,
                rows = record.row_count,
                stored_rows,
                columns = record.normalized_columns.len(),
                ingested_at = %record.ingested_at.to_rfc3339(),
                "loaded table"
            );
        }

        for table in tables
            .iter()
            .filter(|table| !records.iter().any(|record| &record.table_name == *table))
        {
            warn!(table = %table, "table has no provenance record");
        }
    } else {
        warn!(path = %args.db_path.display(), "database file missing");
    }

    if args.index_path.is_file() {
        let store = VectorStore::open(&args.index_path)?;
        match store.existing_collection(&args.collection)? {
            Some(collection) => info!(
                collection = %collection.name(),
                documents = collection.count()?,
                "collection status"
            ),
            None => warn!(collection = %args.collection, "collection missing"),
        }
    } else {
        warn!(path = %args.index_path.display(), "vector store file missing");
    }

    Ok(())
}
