use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Result;

use super::batcher::*;
use super::compose::*;
use super::partition::*;
use super::run::*;
use crate::cli::{IndexArgs, LoadArgs};
use crate::coerce::CellValue;
use crate::config::{LanguageConfig, LanguageSuffixes};
use crate::error::PipelineError;
use crate::semantic::resolve_model_config;
use crate::store::{SourceStore, StoredRow, TableShape, insert_rows, replace_table};
use crate::vector_index::{IndexedDocument, VectorIndex, VectorStore};

/// Keeps the last write per id and the size of every upsert call.
#[derive(Default)]
struct RecordingIndex {
    calls: Vec<usize>,
    documents: BTreeMap<String, IndexedDocument>,
}

impl VectorIndex for RecordingIndex {
    fn upsert(&mut self, documents: &[IndexedDocument]) -> Result<()> {
        self.calls.push(documents.len());
        for document in documents {
            self.documents.insert(document.id.clone(), document.clone());
        }
        Ok(())
    }
}

fn shape(columns: &[&str]) -> TableShape {
    TableShape {
        name: "service".to_string(),
        columns: columns.iter().map(|column| column.to_string()).collect(),
    }
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

fn compose(columns: &[&str], values: Vec<CellValue>) -> Vec<IndexedDocument> {
    let shape = shape(columns);
    let classification = partition_columns(&shape.columns, &LanguageConfig::default());
    compose_row_documents(&shape, &classification, &StoredRow { row_id: 1, values })
}

fn seeded_store(table: &str, columns: &[&str], rows: Vec<Vec<CellValue>>) -> SourceStore {
    let mut store = SourceStore::open_in_memory().unwrap();
    let columns = columns
        .iter()
        .map(|column| column.to_string())
        .collect::<Vec<String>>();
    let tx = store.transaction().unwrap();
    replace_table(&tx, table, &columns).unwrap();
    insert_rows(&tx, table, &columns, &rows).unwrap();
    tx.commit().unwrap();
    store
}

#[test]
fn partition_columns_splits_languages_and_shared_in_order() {
    let columns = [
        "service_id",
        "name_en",
        "name_fr",
        "description_english",
        "fiscal_yr",
        "program_id",
    ]
    .map(str::to_string);

    let classification = partition_columns(&columns, &LanguageConfig::default());

    assert_eq!(classification.languages[0].language, "en");
    assert_eq!(classification.languages[0].columns, vec![1, 3]);
    assert_eq!(classification.languages[1].language, "fr");
    assert_eq!(classification.languages[1].columns, vec![2]);
    assert_eq!(classification.shared, vec![0, 4, 5]);
    assert_eq!(classification.identifiers, vec![0, 5]);

    let mut assigned = classification
        .languages
        .iter()
        .flat_map(|group| group.columns.iter().copied())
        .chain(classification.shared.iter().copied())
        .collect::<Vec<usize>>();
    assigned.sort();
    assert_eq!(assigned, (0..columns.len()).collect::<Vec<usize>>());
}

#[test]
fn partition_columns_assigns_overlapping_suffix_to_first_language() {
    let config = LanguageConfig {
        languages: vec![
            LanguageSuffixes {
                language: "fr".to_string(),
                suffixes: vec!["_fr".to_string()],
            },
            LanguageSuffixes {
                language: "fr_ca".to_string(),
                suffixes: vec!["_fr".to_string(), "_ca".to_string()],
            },
        ],
    };
    let columns = ["title_fr", "region_ca", "code"].map(str::to_string);

    let classification = partition_columns(&columns, &config);
    assert_eq!(classification.languages[0].columns, vec![0]);
    assert_eq!(classification.languages[1].columns, vec![1]);
    assert_eq!(classification.shared, vec![2]);
}

#[test]
fn french_only_row_yields_one_french_document() {
    let documents = compose(
        &["name_en", "name_fr", "notes"],
        vec![CellValue::Null, text("Passeport"), text("   ")],
    );

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].id, "service:1:fr");
    assert_eq!(documents[0].text, "name_fr: Passeport");
    assert_eq!(documents[0].metadata.language, "fr");
    assert_eq!(documents[0].metadata.row_identifier, "service:1");
    assert_eq!(documents[0].metadata.column_count, 3);
}

#[test]
fn shared_only_row_yields_one_unknown_document() {
    let documents = compose(
        &["name_en", "name_fr", "fiscal_yr", "owner_org"],
        vec![CellValue::Null, CellValue::Null, text("2019-2020"), text("ESDC")],
    );

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].id, format!("service:1:{UNKNOWN_LANGUAGE}"));
    assert_eq!(documents[0].metadata.language, UNKNOWN_LANGUAGE);
    assert_eq!(documents[0].text, "fiscal_yr: 2019-2020\nowner_org: ESDC");
}

#[test]
fn english_and_shared_row_yields_one_combined_english_document() {
    let documents = compose(
        &["service_id", "name_en", "name_fr"],
        vec![text("136"), text("Passport"), CellValue::Null],
    );

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].id, "service:1:en");
    assert_eq!(documents[0].metadata.language, "en");
    assert_eq!(documents[0].text, "name_en: Passport\n\nservice_id: 136");
    assert_eq!(documents[0].metadata.identifiers["service_id"], "136");
}

#[test]
fn bilingual_row_yields_one_document_per_language_with_shared_block() {
    let documents = compose(
        &["service_id", "name_en", "name_fr"],
        vec![text("136"), text("Passport"), text("Passeport")],
    );

    let ids = documents
        .iter()
        .map(|document| document.id.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(ids, vec!["service:1:en", "service:1:fr"]);
    assert_eq!(documents[1].text, "name_fr: Passeport\n\nservice_id: 136");
}

#[test]
fn empty_row_yields_no_documents() {
    let documents = compose(
        &["service_id", "name_en"],
        vec![CellValue::Null, text("  ")],
    );
    assert!(documents.is_empty());
}

#[test]
fn identifier_metadata_is_capped_and_skips_nulls() {
    let documents = compose(
        &["a_id", "b_id", "c_id", "d_id"],
        vec![text("1"), CellValue::Null, text("3"), text("4")],
    );

    assert_eq!(documents.len(), 1);
    let identifiers = &documents[0].metadata.identifiers;
    assert_eq!(identifiers.len(), 2);
    assert_eq!(identifiers["a_id"], "1");
    assert_eq!(identifiers["c_id"], "3");
    assert!(!identifiers.contains_key("d_id"));
}

#[test]
fn batch_boundary_produces_exactly_two_upserts_for_130_documents() {
    let rows = (0..130)
        .map(|index| vec![text(&format!("owner {index}"))])
        .collect::<Vec<Vec<CellValue>>>();
    let store = seeded_store("orgs", &["owner_org"], rows);
    let mut index = RecordingIndex::default();

    let entry = index_table(
        &store,
        "orgs",
        &LanguageConfig::default(),
        &mut index,
        VECTOR_BATCH_SIZE,
    )
    .unwrap();

    assert_eq!(entry.rows_scanned, 130);
    assert_eq!(entry.documents, 130);
    assert_eq!(entry.batches, 2);
    assert_eq!(index.calls, vec![128, 2]);
}

#[test]
fn reindexing_overwrites_instead_of_duplicating() {
    let store = seeded_store(
        "service",
        &["service_id", "name_en", "name_fr"],
        vec![
            vec![text("1"), text("Passport"), text("Passeport")],
            vec![text("2"), CellValue::Null, CellValue::Null],
        ],
    );
    let tables = store.list_tables().unwrap();
    let config = LanguageConfig::default();

    let mut recording = RecordingIndex::default();
    index_tables(&store, &tables, &config, &mut recording, VECTOR_BATCH_SIZE).unwrap();
    let first_pass = recording.documents.len();
    index_tables(&store, &tables, &config, &mut recording, VECTOR_BATCH_SIZE).unwrap();
    assert_eq!(recording.documents.len(), first_pass);
    assert_eq!(first_pass, 3);
    assert_eq!(recording.calls.len(), 2);

    let vector_store = VectorStore::open_in_memory().unwrap();
    let mut collection = vector_store
        .get_or_create_collection("services", &resolve_model_config("").unwrap())
        .unwrap();
    let once = index_tables(&store, &tables, &config, &mut collection, VECTOR_BATCH_SIZE).unwrap();
    let count_once = collection.count().unwrap();
    index_tables(&store, &tables, &config, &mut collection, VECTOR_BATCH_SIZE).unwrap();

    assert_eq!(once[0].documents as i64, count_once);
    assert_eq!(collection.count().unwrap(), count_once);
}

#[test]
fn resolve_tables_lists_every_missing_name() {
    let available = vec!["program".to_string(), "service".to_string()];

    let err = resolve_tables(
        available.clone(),
        &["zeta".to_string(), "service".to_string(), "alpha".to_string()],
    )
    .unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::TableNotFound(missing)) => {
            assert_eq!(missing, &vec!["alpha".to_string(), "zeta".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let selected = resolve_tables(
        available.clone(),
        &["service".to_string(), "program".to_string()],
    )
    .unwrap();
    assert_eq!(selected, vec!["program", "service"]);
    assert_eq!(resolve_tables(available.clone(), &[]).unwrap(), available);
}

#[test]
fn batcher_skips_empty_flushes() {
    let mut index = RecordingIndex::default();
    let stats = IndexBatcher::new(&mut index, 4).finish().unwrap();

    assert_eq!(stats, BatchStats::default());
    assert!(index.calls.is_empty());
}

#[test]
fn ledger_table_is_never_indexed() {
    let store = seeded_store("service", &["name_en"], vec![vec![text("Passport")]]);
    let tables = resolve_tables(store.list_tables().unwrap(), &[]).unwrap();
    assert_eq!(tables, vec!["service"]);

    let err = resolve_tables(
        store.list_tables().unwrap(),
        &[crate::ledger::LEDGER_TABLE.to_string()],
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::TableNotFound(_))
    ));
}

fn index_args(db_path: &Path, index_path: &Path, reset: bool) -> IndexArgs {
    IndexArgs {
        db_path: db_path.to_path_buf(),
        index_path: index_path.to_path_buf(),
        collection: "services".to_string(),
        model_id: String::new(),
        tables: Vec::new(),
        config: None,
        manifest_dir: None,
        reset,
    }
}

#[test]
fn run_without_database_reports_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("absent.sqlite");

    let err = run(index_args(&db_path, &dir.path().join("index.sqlite"), false)).unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::MissingDatabase(path)) => assert_eq!(path, &db_path),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!dir.path().join("index.sqlite").exists());
}

#[test]
fn run_after_load_indexes_every_document_and_reset_rebuilds() {
    let dir = tempfile::tempdir().unwrap();
    let datasets = dir.path().join("datasets");
    fs::create_dir_all(&datasets).unwrap();
    fs::write(
        datasets.join("service.csv"),
        "Service ID,Name EN,Name FR\n1,Passport,Passeport\n2,,\n",
    )
    .unwrap();
    let db_path = dir.path().join("processed").join("datasets.sqlite");
    let index_path = dir.path().join("vectorstore").join("index.sqlite");

    crate::commands::load::run(LoadArgs {
        datasets,
        db_path: db_path.clone(),
        manifest_dir: None,
        reset: false,
    })
    .unwrap();

    let first = run(index_args(&db_path, &index_path, false)).unwrap();
    assert_eq!(first, 3);

    let rebuilt = run(index_args(&db_path, &index_path, true)).unwrap();
    assert_eq!(rebuilt, first);

    let vector_store = VectorStore::open(&index_path).unwrap();
    let collection = vector_store.existing_collection("services").unwrap().unwrap();
    assert_eq!(collection.count().unwrap(), 3);

    let manifests = fs::read_dir(dir.path().join("vectorstore").join("manifests"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect::<Vec<_>>();
    assert!(!manifests.is_empty());
    let manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(&manifests[0]).unwrap()).unwrap();
    assert_eq!(manifest["total_documents"], 3);
    assert_eq!(manifest["collection_documents"], 3);
    assert_eq!(manifest["tables"][0]["table_name"], "service");
}
