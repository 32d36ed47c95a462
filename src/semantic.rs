use anyhow::{Result, bail};
use sha2::{Digest, Sha256};

pub const DEFAULT_MODEL_ID: &str = "hash-bigram-384-v1";
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Model ids understood by the local embedder and their vector widths.
const SUPPORTED_MODELS: [(&str, usize); 2] = [
    (DEFAULT_MODEL_ID, DEFAULT_EMBEDDING_DIM),
    ("hash-bigram-768-v1", 768),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticModelConfig {
    pub model_id: String,
    pub dimensions: usize,
}

/// Resolves `model_id` (blank means the default) to a supported hash model.
pub fn resolve_model_config(model_id: &str) -> Result<SemanticModelConfig> {
    let trimmed = model_id.trim();
    let resolved_id = if trimmed.is_empty() {
        DEFAULT_MODEL_ID
    } else {
        trimmed
    };

    let Some((id, dimensions)) = SUPPORTED_MODELS
        .iter()
        .find(|(candidate, _)| *candidate == resolved_id)
    else {
        let known = SUPPORTED_MODELS
            .iter()
            .map(|(candidate, _)| *candidate)
            .collect::<Vec<&str>>()
            .join(", ");
        bail!("unsupported model id '{resolved_id}'; expected one of: {known}");
    };

    Ok(SemanticModelConfig {
        model_id: id.to_string(),
        dimensions: *dimensions,
    })
}

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

pub fn embedding_text_hash(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Feature-hashing embedding over word unigrams and bigrams.
///
/// Deterministic across processes and builds, so stored vectors stay
/// comparable with query vectors computed later.
pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(8);
    let mut vector = vec![0_f32; dims];

    for token in tokenize_payload(payload) {
        let hash = stable_hash(&token);
        let index = (hash % dims as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
        vector[index] += sign * weight;
    }

    normalize_vector(&mut vector);
    vector
}

/// Dot product; inputs are expected to be L2 normalized.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    left.iter()
        .zip(right.iter())
        .map(|(left_value, right_value)| f64::from(*left_value) * f64::from(*right_value))
        .sum::<f64>()
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.saturating_mul(4) {
        return None;
    }

    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

fn stable_hash(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn tokenize_payload(payload: &str) -> Vec<String> {
    let words = payload
        .split(|character: char| !character.is_alphanumeric())
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<String>>();

    let mut features = Vec::<String>::with_capacity(words.len() * 2);
    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}
