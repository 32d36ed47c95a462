use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SourceLoadEntry {
    pub source_file: String,
    pub table_name: String,
    pub sha256: String,
    pub column_count: usize,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: String,
    pub datasets_dir: String,
    pub db_path: String,
    pub reset: bool,
    pub tables_dropped: usize,
    pub sources: Vec<SourceLoadEntry>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableIndexEntry {
    pub table_name: String,
    pub column_count: usize,
    pub rows_scanned: usize,
    pub documents: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: String,
    pub db_path: String,
    pub index_path: String,
    pub collection: String,
    pub model_id: String,
    pub languages: Vec<String>,
    pub reset: bool,
    pub requested_tables: Vec<String>,
    pub tables: Vec<TableIndexEntry>,
    pub total_documents: usize,
    pub collection_documents: i64,
}
