use serde::{Deserialize, Serialize};

/// Compact cross-request memory persisted per session. Perception folds the
/// previous request's digest into its output; the runtime refreshes it after
/// every terminal event.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionDigest {
    #[serde(default)]
    pub last_query: String,
    #[serde(default)]
    pub explored_files: Vec<String>,
    #[serde(default)]
    pub citations: Vec<String>,
}

impl SessionDigest {
    pub fn is_empty(&self) -> bool {
        self.last_query.is_empty() && self.explored_files.is_empty() && self.citations.is_empty()
    }

    /// One-line rendering for prompt context.
    pub fn summary_line(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let files = if self.explored_files.is_empty() {
            String::new()
        } else {
            format!(" explored: {}", self.explored_files.join(", "))
        };
        format!("previous query: {:?}{files}", self.last_query)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }
}
