use crate::citation::Citation;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Outcome of a single tool invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    NotFound,
    ToolUnavailable,
    Error,
}

/// One fallback strategy tried by a tool, in execution order.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct AttemptRecord {
    /// 1-indexed step within the owning tool call.
    pub step: usize,
    pub strategy: String,
    pub outcome: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn new(step: usize, strategy: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            step,
            strategy: strategy.into(),
            outcome: outcome.into(),
            params: serde_json::Value::Null,
            error: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// Uniform result shape returned by every tool.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ToolResult {
    pub tool: String,
    pub status: ToolStatus,
    /// Strategy that produced the payload, when a fallback chain succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found_via: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub attempt_history: Vec<AttemptRecord>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(tool: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            status: ToolStatus::Success,
            found_via: None,
            data,
            attempt_history: Vec::new(),
            citations: Vec::new(),
            error: None,
        }
    }

    pub fn not_found(tool: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            status: ToolStatus::NotFound,
            found_via: None,
            data,
            attempt_history: Vec::new(),
            citations: Vec::new(),
            error: None,
        }
    }

    pub fn unavailable(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        Self {
            tool: tool.clone(),
            status: ToolStatus::ToolUnavailable,
            found_via: None,
            data: serde_json::Value::Null,
            attempt_history: Vec::new(),
            citations: Vec::new(),
            error: Some(format!("tool '{tool}' is not registered")),
        }
    }

    pub fn error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            status: ToolStatus::Error,
            found_via: None,
            data: serde_json::Value::Null,
            attempt_history: Vec::new(),
            citations: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn with_found_via(mut self, via: impl Into<String>) -> Self {
        self.found_via = Some(via.into());
        self
    }

    pub fn with_attempts(mut self, attempts: Vec<AttemptRecord>) -> Self {
        self.attempt_history = attempts;
        self
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }
}
