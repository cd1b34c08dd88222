use crate::embeddings::{cosine, Embedder};
use serde::{Deserialize, Serialize};

/// One semantic hit from the vector index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticHit {
    pub path: String,
    pub line: usize,
    pub score: f32,
    pub snippet: String,
}

const MIN_SCORE: f32 = 0.1;

struct VectorEntry {
    path: String,
    line: usize,
    snippet: String,
    vector: Vec<f32>,
}

/// Brute-force cosine index over chunk embeddings.
///
/// Vectors are unit-normalized at insert, so the dot product is the score.
#[derive(Default)]
pub struct VectorIndex {
    entries: Vec<VectorEntry>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, embedder: &Embedder, path: &str, line: usize, text: &str) {
        let snippet: String = text.chars().take(160).collect();
        self.entries.push(VectorEntry {
            path: path.to_string(),
            line,
            snippet,
            vector: embedder.embed(text),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-k by cosine similarity, optionally restricted to a path prefix.
    pub fn search(
        &self,
        embedder: &Embedder,
        query: &str,
        limit: usize,
        scope: Option<&str>,
    ) -> Vec<SemanticHit> {
        let query_vec = embedder.embed(query);
        let mut scored: Vec<SemanticHit> = self
            .entries
            .iter()
            .filter(|e| scope.is_none_or(|prefix| e.path.starts_with(prefix)))
            .map(|e| SemanticHit {
                path: e.path.clone(),
                line: e.line,
                score: cosine(&query_vec, &e.vector),
                snippet: e.snippet.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        // Drop hits whose similarity is indistinguishable from hash noise.
        scored.retain(|hit| hit.score > MIN_SCORE);
        scored
    }

    /// Nearest entries to an existing path's chunks, excluding that path.
    pub fn similar_to(
        &self,
        embedder: &Embedder,
        reference_text: &str,
        exclude_path: &str,
        limit: usize,
    ) -> Vec<SemanticHit> {
        let mut hits = self.search(embedder, reference_text, limit + 8, None);
        hits.retain(|h| h.path != exclude_path);
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_ranks_overlapping_chunks_first() {
        let embedder = Embedder::new().expect("embedder");
        let mut index = VectorIndex::new();
        index.insert(&embedder, "src/auth.py", 10, "def login(user): validate password");
        index.insert(&embedder, "src/tree.py", 3, "def walk(depth): enumerate directories");

        let hits = index.search(&embedder, "where is the login password check", 5, None);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].path, "src/auth.py");
        assert_eq!(hits[0].line, 10);
    }

    #[test]
    fn scope_filter_restricts_paths() {
        let embedder = Embedder::new().expect("embedder");
        let mut index = VectorIndex::new();
        index.insert(&embedder, "src/auth.py", 1, "login password");
        index.insert(&embedder, "tests/auth.py", 1, "login password");

        let hits = index.search(&embedder, "login password", 5, Some("tests/"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "tests/auth.py");
    }
}
