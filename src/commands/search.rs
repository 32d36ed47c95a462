use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::SearchArgs;
use crate::semantic::normalize_whitespace;
use crate::vector_index::VectorStore;

const MAX_RESULTS: usize = 20;
const SNIPPET_CHARS: usize = 160;

pub fn run(args: SearchArgs) -> Result<()> {
    if !args.index_path.is_file() {
        bail!(
            "vector store not found at {}; run `index` first",
            args.index_path.display()
        );
    }

    let store = VectorStore::open(&args.index_path)?;
    let Some(collection) = store.existing_collection(&args.collection)? else {
        bail!("collection '{}' does not exist", args.collection);
    };

    let limit = args.limit.clamp(1, MAX_RESULTS);
    let filter = args
        .language
        .iter()
        .map(|language| ("language".to_string(), language.clone()))
        .collect::<Vec<(String, String)>>();

    if args.query.trim().is_empty() {
        warn!("empty query; nothing to search");
        return Ok(());
    }

    let hits = collection.query(&args.query, &filter, limit)?;
    info!(
        collection = %collection.name(),
        language = %args.language.as_deref().unwrap_or("any"),
        limit,
        hits = hits.len(),
        "search completed"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{:>2}. {} [{}] distance={:.4}",
            rank + 1,
            hit.id,
            hit.metadata.language,
            hit.distance
        );
        println!("    {}", snippet(&hit.document));
    }

    Ok(())
}

fn snippet(document: &str) -> String {
    let flattened = normalize_whitespace(document);
    if flattened.chars().count() <= SNIPPET_CHARS {
        return flattened;
    }

    let mut out = flattened.chars().take(SNIPPET_CHARS).collect::<String>();
    out.push_str("...");
    out
}
