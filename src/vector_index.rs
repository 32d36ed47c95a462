use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::semantic::{
    SemanticModelConfig, cosine_similarity, decode_embedding_blob, embed_text_local,
    embedding_text_hash, encode_embedding_blob, resolve_model_config,
};
use crate::util::{ensure_parent_directory, now_utc_string};

pub const COSINE_DISTANCE: &str = "cosine";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub language: String,
    pub table_name: String,
    pub row_identifier: String,
    pub column_count: usize,
    /// Identifier-like column values copied from the source row.
    #[serde(flatten)]
    pub identifiers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
    pub metadata: DocumentMetadata,
    pub distance: f64,
}

/// Destination of composed documents. Writing an id that already exists
/// replaces the stored text and metadata.
pub trait VectorIndex {
    fn upsert(&mut self, documents: &[IndexedDocument]) -> Result<()>;
}

/// SQLite-backed collection store with locally computed embeddings.
pub struct VectorStore {
    connection: Connection,
}

impl VectorStore {
    pub fn open(path: &Path) -> Result<Self> {
        ensure_parent_directory(path)?;
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open vector store {}", path.display()))?;
        Self::from_connection(connection)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to set journal_mode=WAL for vector store")?;
        connection
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous=NORMAL for vector store")?;
        ensure_vector_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Returns whether a collection was removed.
    pub fn delete_collection(&mut self, name: &str) -> Result<bool> {
        let tx = self.connection.transaction()?;
        tx.execute("DELETE FROM documents WHERE collection = ?1", [name])?;
        let removed = tx.execute("DELETE FROM collections WHERE name = ?1", [name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn collection_exists(&self, name: &str) -> Result<bool> {
        let found = self
            .connection
            .query_row(
                "SELECT 1 FROM collections WHERE name = ?1 LIMIT 1",
                [name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_or_create_collection(
        &self,
        name: &str,
        model: &SemanticModelConfig,
    ) -> Result<Collection<'_>> {
        self.connection.execute(
            "
            INSERT INTO collections(name, distance, model_id, dimensions, created_at)
            VALUES(?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(name) DO NOTHING
            ",
            params![
                name,
                COSINE_DISTANCE,
                model.model_id,
                model.dimensions as i64,
                now_utc_string()
            ],
        )?;

        let (stored_model_id, stored_dimensions): (String, i64) = self.connection.query_row(
            "SELECT model_id, dimensions FROM collections WHERE name = ?1",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if stored_model_id != model.model_id || stored_dimensions as usize != model.dimensions {
            bail!(
                "collection '{name}' was built with model '{stored_model_id}' ({stored_dimensions} dims); \
                 rerun with --reset to rebuild it with '{}'",
                model.model_id
            );
        }

        Ok(Collection {
            connection: &self.connection,
            name: name.to_string(),
            model: model.clone(),
        })
    }

    /// Opens an existing collection using the model it was built with.
    pub fn existing_collection(&self, name: &str) -> Result<Option<Collection<'_>>> {
        let stored = self
            .connection
            .query_row(
                "SELECT model_id FROM collections WHERE name = ?1",
                [name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        stored
            .map(|model_id| {
                Ok(Collection {
                    connection: &self.connection,
                    name: name.to_string(),
                    model: resolve_model_config(&model_id)?,
                })
            })
            .transpose()
    }
}

pub struct Collection<'a> {
    connection: &'a Connection,
    name: String,
    model: SemanticModelConfig,
}

impl Collection<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> Result<i64> {
        let count = self.connection.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [&self.name],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Result<Option<(String, DocumentMetadata)>> {
        let row = self
            .connection
            .query_row(
                "SELECT text, metadata_json FROM documents WHERE collection = ?1 AND doc_id = ?2",
                params![self.name, id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        row.map(|(text, metadata_json)| {
            let metadata = serde_json::from_str::<DocumentMetadata>(&metadata_json)
                .with_context(|| format!("failed to parse metadata for document {id}"))?;
            Ok((text, metadata))
        })
        .transpose()
    }

    /// Nearest documents to `query_text` by cosine distance, optionally
    /// restricted to documents whose metadata matches every `filter` pair exactly.
    pub fn query(
        &self,
        query_text: &str,
        filter: &[(String, String)],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if query_text.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT doc_id, text, metadata_json, embedding FROM documents WHERE collection = ?1",
        );
        let mut bindings = vec![self.name.clone()];
        for (key, value) in filter {
            if key.contains('"') {
                bail!("invalid metadata filter key: {key}");
            }
            bindings.push(format!("$.\"{key}\""));
            bindings.push(value.clone());
            sql.push_str(&format!(
                " AND CAST(json_extract(metadata_json, ?{}) AS TEXT) = ?{}",
                bindings.len() - 1,
                bindings.len()
            ));
        }

        let query_vector = embed_text_local(query_text, self.model.dimensions);
        let mut statement = self.connection.prepare(&sql)?;
        let mut rows = statement.query(params_from_iter(bindings.iter()))?;
        let mut hits = Vec::<SearchHit>::new();

        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(3)?;
            let Some(vector) = decode_embedding_blob(&blob, self.model.dimensions) else {
                continue;
            };
            let metadata_json: String = row.get(2)?;
            let metadata = serde_json::from_str::<DocumentMetadata>(&metadata_json)
                .with_context(|| format!("failed to parse metadata for document {id}"))?;

            hits.push(SearchHit {
                id,
                document: row.get(1)?,
                metadata,
                distance: 1.0 - cosine_similarity(&query_vector, &vector),
            });
        }

        hits.sort_by(|left, right| {
            left.distance
                .partial_cmp(&right.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.id.cmp(&right.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

impl VectorIndex for Collection<'_> {
    /// Documents whose stored text hash and width already match keep their
    /// embedding; only their metadata is rewritten.
    fn upsert(&mut self, documents: &[IndexedDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let tx = self.connection.unchecked_transaction()?;
        let mut embedded = 0usize;
        {
            let mut stored = tx.prepare_cached(
                "SELECT text_hash, embedding_dim FROM documents WHERE collection = ?1 AND doc_id = ?2",
            )?;
            let mut refresh = tx.prepare_cached(
                "
                UPDATE documents
                SET metadata_json = ?3, updated_at = ?4
                WHERE collection = ?1 AND doc_id = ?2
                ",
            )?;
            let mut write = tx.prepare_cached(
                "
                INSERT INTO documents(collection, doc_id, text, metadata_json, embedding, embedding_dim, text_hash, updated_at)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(collection, doc_id) DO UPDATE SET
                  text=excluded.text,
                  metadata_json=excluded.metadata_json,
                  embedding=excluded.embedding,
                  embedding_dim=excluded.embedding_dim,
                  text_hash=excluded.text_hash,
                  updated_at=excluded.updated_at
                ",
            )?;
            let updated_at = now_utc_string();

            for document in documents {
                let metadata_json = serde_json::to_string(&document.metadata)?;
                let text_hash = embedding_text_hash(&document.text);
                let previous = stored
                    .query_row(params![self.name, document.id], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })
                    .optional()?;

                let unchanged = previous.is_some_and(|(stored_hash, stored_dim)| {
                    stored_hash == text_hash && stored_dim as usize == self.model.dimensions
                });
                if unchanged {
                    refresh
                        .execute(params![self.name, document.id, metadata_json, updated_at])
                        .with_context(|| format!("failed to refresh document {}", document.id))?;
                    continue;
                }

                let embedding = embed_text_local(&document.text, self.model.dimensions);
                write
                    .execute(params![
                        self.name,
                        document.id,
                        document.text,
                        metadata_json,
                        encode_embedding_blob(&embedding),
                        self.model.dimensions as i64,
                        text_hash,
                        updated_at,
                    ])
                    .with_context(|| format!("failed to upsert document {}", document.id))?;
                embedded += 1;
            }
        }
        tx.commit()?;

        debug!(
            collection = %self.name,
            documents = documents.len(),
            embedded,
            "upserted documents"
        );
        Ok(())
    }
}

fn ensure_vector_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS collections (
              name TEXT PRIMARY KEY,
              distance TEXT NOT NULL,
              model_id TEXT NOT NULL,
              dimensions INTEGER NOT NULL,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
              collection TEXT NOT NULL,
              doc_id TEXT NOT NULL,
              text TEXT NOT NULL,
              metadata_json TEXT NOT NULL,
              embedding BLOB NOT NULL,
              embedding_dim INTEGER NOT NULL,
              text_hash TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              PRIMARY KEY (collection, doc_id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            ",
        )
        .context("failed to initialize vector store schema")?;
    Ok(())
}
