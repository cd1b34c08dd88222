use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("tool '{0}' is not read-only and cannot be registered")]
    WriteToolRejected(String),

    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("store error: {0}")]
    Store(#[from] analyst_store::StoreError),

    #[error("{0}")]
    Internal(String),
}
