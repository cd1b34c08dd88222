use crate::error::Result;
use analyst_protocol::now_ms;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Opaque-bytes key/value persistence for per-session working memory.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn save(&self, key: &str, state: &[u8]) -> Result<()>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, state: &[u8]) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(key.to_string(), state.to_vec());
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub request_id: String,
    pub timestamp_ms: u64,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Append-only audit trail keyed by request id.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(
        &self,
        request_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<()>;

    async fn events_for(&self, request_id: &str) -> Result<Vec<LoggedEvent>>;
}

#[derive(Default)]
pub struct MemoryEventLog {
    inner: RwLock<Vec<LoggedEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(
        &self,
        request_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.inner.write().await.push(LoggedEvent {
            request_id: request_id.to_string(),
            timestamp_ms: now_ms(),
            event_type: event_type.to_string(),
            payload,
        });
        Ok(())
    }

    async fn events_for(&self, request_id: &str) -> Result<Vec<LoggedEvent>> {
        Ok(self
            .inner
            .read()
            .await
            .iter()
            .filter(|e| e.request_id == request_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_store_round_trip() {
        let store = MemorySessionStore::new();
        assert!(store.load("s1").await.expect("load").is_none());
        store.save("s1", b"digest").await.expect("save");
        assert_eq!(store.load("s1").await.expect("load"), Some(b"digest".to_vec()));
    }

    #[tokio::test]
    async fn event_log_filters_by_request() {
        let log = MemoryEventLog::new();
        log.append("r1", "stage", serde_json::json!({"stage": "intent"}))
            .await
            .expect("append");
        log.append("r2", "stage", serde_json::json!({"stage": "planner"}))
            .await
            .expect("append");

        let events = log.events_for("r1").await.expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "stage");
    }
}
