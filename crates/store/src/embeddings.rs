use crate::error::{Result, StoreError};
use sha2::{Digest, Sha256};
use std::env;

pub const EMBEDDING_DIM: usize = 384;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EmbeddingMode {
    Stub,
}

impl EmbeddingMode {
    fn from_env() -> Result<Self> {
        let raw = env::var("ANALYST_EMBEDDING_MODE")
            .unwrap_or_else(|_| "stub".to_string())
            .to_ascii_lowercase();
        match raw.as_str() {
            "stub" => Ok(Self::Stub),
            other => Err(StoreError::Embedding(format!(
                "Unsupported ANALYST_EMBEDDING_MODE '{other}'; only 'stub' runs in-process \
                 (model-backed embeddings come from the inference service)"
            ))),
        }
    }
}

/// Deterministic 384-dimension text embedder.
///
/// Stub mode hashes each token into a handful of dimensions and normalizes
/// the sum, so overlapping token sets produce correlated vectors. Good enough
/// for exercising the vector-search path without a model runtime.
pub struct Embedder {
    mode: EmbeddingMode,
}

impl Embedder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            mode: EmbeddingMode::from_env()?,
        })
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        match self.mode {
            EmbeddingMode::Stub => stub_embedding(text),
        }
    }
}

fn stub_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];

    for token in tokenize(text) {
        let digest = Sha256::digest(token.as_bytes());
        // Four (dimension, sign) pairs per token.
        for pair in digest.chunks_exact(8).take(4) {
            let dim = u64::from_le_bytes([
                pair[0], pair[1], pair[2], pair[3], pair[4], pair[5], pair[6], pair[7],
            ]) as usize
                % EMBEDDING_DIM;
            let sign = if pair[0] & 1 == 0 { 1.0 } else { -1.0 };
            vector[dim] += sign;
        }
    }

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_ascii_lowercase())
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
