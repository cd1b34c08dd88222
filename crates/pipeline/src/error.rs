use crate::llm::LlmError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed llm output at {stage}: {message}")]
    MalformedOutput { stage: &'static str, message: String },

    #[error("tool error: {0}")]
    Tool(#[from] analyst_tools::ToolError),

    #[error("store error: {0}")]
    Store(#[from] analyst_store::StoreError),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("{0}")]
    Internal(String),
}
