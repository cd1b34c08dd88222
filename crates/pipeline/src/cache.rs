use analyst_protocol::{now_ms, QueryResponse, TerminationReason};
use analyst_store::SessionStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const DEFAULT_TTL_MS: u64 = 10 * 60 * 1_000;

#[derive(Serialize, Deserialize)]
struct CachedExplanation {
    stored_at_ms: u64,
    response: QueryResponse,
}

/// Content-addressed cache of completed answers, keyed by a fingerprint of
/// (project root, normalized query). Backed by the session store, so swapping
/// in the persistent collaborator caches across processes.
pub struct ExplanationCache {
    store: Arc<dyn SessionStore>,
    ttl_ms: u64,
}

/// Fingerprint for a query against one project root.
pub fn fingerprint(root: &str, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.as_bytes());
    hasher.update([0]);
    hasher.update(query.trim().to_lowercase().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

impl ExplanationCache {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            ttl_ms: DEFAULT_TTL_MS,
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    fn key(root: &str, query: &str) -> String {
        format!("explain:{}", fingerprint(root, query))
    }

    pub async fn get(&self, root: &str, query: &str) -> Option<QueryResponse> {
        let bytes = self.store.load(&Self::key(root, query)).await.ok()??;
        let cached: CachedExplanation = serde_json::from_slice(&bytes).ok()?;
        if now_ms().saturating_sub(cached.stored_at_ms) > self.ttl_ms {
            return None;
        }
        Some(cached.response)
    }

    /// Only fully completed answers are worth replaying.
    pub async fn put(&self, root: &str, query: &str, response: &QueryResponse) {
        if response.termination_reason != TerminationReason::Completed {
            return;
        }
        let cached = CachedExplanation {
            stored_at_ms: now_ms(),
            response: response.clone(),
        };
        let Ok(bytes) = serde_json::to_vec(&cached) else {
            return;
        };
        if let Err(err) = self.store.save(&Self::key(root, query), &bytes).await {
            log::debug!("explanation cache write failed: {err}");
        }
    }
}
