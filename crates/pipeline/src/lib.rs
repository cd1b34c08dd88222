mod accountant;
mod cache;
mod context;
mod digest;
mod error;
mod heuristic;
mod llm;
mod runtime;
mod service;
mod stages;
pub mod test_support;

pub use accountant::{BoundsAccountant, QuotaCheck, ResourceAccountant};
pub use cache::{fingerprint, ExplanationCache};
pub use context::{summarize_tool_result, MAX_ITEMS_PER_TOOL, MAX_SNIPPET_CHARS};
pub use digest::SessionDigest;
pub use error::{PipelineError, Result};
pub use heuristic::HeuristicLlm;
pub use llm::{Completion, CompletionOptions, LlmClient, LlmError, StreamDelta};
pub use runtime::{terminal_response, PipelineRuntime, RuntimeHandles};
pub use service::{AnalystService, QueryHandle, ServiceBuilder};
pub use stages::{standard_pipeline, StageDef, StageKind};
