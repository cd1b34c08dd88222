use crate::bounds::ResourceUsage;
use crate::citation::Citation;
use crate::envelope::TerminationReason;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn unix_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn now_ms() -> u64 {
    unix_ms(SystemTime::now())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Started,
    Completed,
    Failed,
}

/// Emitted on the per-request event channel at every stage boundary.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct StageEvent {
    pub request_id: String,
    pub stage: String,
    pub status: StageStatus,
    pub summary: String,
    pub timestamp_ms: u64,
}

/// Final payload of both `query` and `query_stream`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryResponse {
    pub final_response: String,
    pub citations: Vec<Citation>,
    pub termination_reason: TerminationReason,
    pub usage: ResourceUsage,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct TerminalEvent {
    pub request_id: String,
    pub response: QueryResponse,
    /// Plain-language explanation, present when the reason is not `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub timestamp_ms: u64,
}

/// Everything the service façade forwards to stream consumers. Each request's
/// stream is a sequence of `Stage` events ending in exactly one `Terminal`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    Stage(StageEvent),
    Terminal(TerminalEvent),
}

/// Service request shape.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<QueryOptions>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
            options: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reintent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}
