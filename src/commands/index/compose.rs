use std::collections::BTreeMap;

use crate::store::{StoredRow, TableShape};
use crate::vector_index::{DocumentMetadata, IndexedDocument};

use super::partition::ColumnClassification;

/// Language tag of documents built only from shared columns.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

pub(crate) const MAX_IDENTIFIER_FIELDS: usize = 3;

/// Turns one row into its language documents.
///
/// A language yields a document only when its own columns carry text; the
/// language block comes first, then a blank line, then the shared block if
/// any. Rows with shared text but no language text yield a single `unknown`
/// document instead. Rows with no text at all yield nothing.
pub(crate) fn compose_row_documents(
    shape: &TableShape,
    classification: &ColumnClassification,
    row: &StoredRow,
) -> Vec<IndexedDocument> {
    let row_identifier = format!("{}:{}", shape.name, row.row_id);
    let shared_text = build_text(shape, row, &classification.shared);
    let identifiers = identifier_values(shape, row, &classification.identifiers);
    let mut documents = Vec::new();

    for group in &classification.languages {
        let Some(language_text) = build_text(shape, row, &group.columns) else {
            continue;
        };
        let content = match shared_text.as_deref() {
            Some(shared_text) => format!("{language_text}\n\n{shared_text}"),
            None => language_text,
        };

        documents.push(document(
            shape,
            &row_identifier,
            &group.language,
            content,
            &identifiers,
        ));
    }

    if documents.is_empty() {
        if let Some(shared_text) = shared_text {
            documents.push(document(
                shape,
                &row_identifier,
                UNKNOWN_LANGUAGE,
                shared_text,
                &identifiers,
            ));
        }
    }

    documents
}

fn document(
    shape: &TableShape,
    row_identifier: &str,
    language: &str,
    text: String,
    identifiers: &BTreeMap<String, String>,
) -> IndexedDocument {
    IndexedDocument {
        id: format!("{row_identifier}:{language}"),
        text,
        metadata: DocumentMetadata {
            language: language.to_string(),
            table_name: shape.name.clone(),
            row_identifier: row_identifier.to_string(),
            column_count: shape.column_count(),
            identifiers: identifiers.clone(),
        },
    }
}

/// `column: value` lines for the non-empty cells of `columns`, or `None`.
fn build_text(shape: &TableShape, row: &StoredRow, columns: &[usize]) -> Option<String> {
    let parts = columns
        .iter()
        .filter_map(|&index| {
            let value = row.values.get(index)?.clean_text()?;
            Some(format!("{}: {value}", shape.columns[index]))
        })
        .collect::<Vec<String>>();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn identifier_values(
    shape: &TableShape,
    row: &StoredRow,
    identifier_columns: &[usize],
) -> BTreeMap<String, String> {
    identifier_columns
        .iter()
        .take(MAX_IDENTIFIER_FIELDS)
        .filter_map(|&index| {
            let value = row.values.get(index)?.clean_text()?;
            Some((shape.columns[index].clone(), value))
        })
        .collect()
}
