use crate::catalog::{RiskLevel, ToolDescriptor, TOOL_CATALOG};
use crate::composed;
use crate::error::{Result, ToolError};
use crate::primitives;
use analyst_protocol::{ContextBounds, ToolResult};
use analyst_store::{CodeIndex, FileStore, GitStore};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Shared handles every tool runs against.
pub struct Toolbox {
    pub index: Arc<CodeIndex>,
    pub files: Arc<FileStore>,
    pub git: Arc<GitStore>,
    pub bounds: ContextBounds,
}

impl Toolbox {
    pub fn new(
        index: Arc<CodeIndex>,
        files: Arc<FileStore>,
        git: Arc<GitStore>,
        bounds: ContextBounds,
    ) -> Self {
        Self {
            index,
            files,
            git,
            bounds,
        }
    }
}

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolResult>> + Send>>;
pub type ToolHandler = Arc<dyn Fn(Arc<Toolbox>, serde_json::Value) -> ToolFuture + Send + Sync>;

/// Wrap a typed async tool function into a registry handler. Argument maps
/// that fail to deserialize (including unknown fields) are rejected before
/// the tool runs.
pub(crate) fn typed_handler<A, F, Fut>(tool_name: &'static str, f: F) -> ToolHandler
where
    A: DeserializeOwned + Send + 'static,
    F: Fn(Arc<Toolbox>, A) -> Fut + Send + Sync + Copy + 'static,
    Fut: Future<Output = Result<ToolResult>> + Send + 'static,
{
    Arc::new(move |toolbox, value| -> ToolFuture {
        Box::pin(async move {
            let args: A =
                serde_json::from_value(value).map_err(|err| ToolError::InvalidArguments {
                    tool: tool_name.to_string(),
                    message: err.to_string(),
                })?;
            f(toolbox, args).await
        })
    })
}

/// Mutable registration phase. Frozen into a `ToolRegistry` before serving.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(ToolDescriptor, ToolHandler)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one tool. Anything that is not read-only is a programmer
    /// error and fails here, before the registry can serve traffic.
    pub fn register(&mut self, descriptor: ToolDescriptor, handler: ToolHandler) -> Result<()> {
        if descriptor.risk != RiskLevel::ReadOnly {
            return Err(ToolError::WriteToolRejected(descriptor.name.to_string()));
        }
        if self.entries.iter().any(|(d, _)| d.name == descriptor.name) {
            return Err(ToolError::DuplicateTool(descriptor.name.to_string()));
        }
        self.entries.push((descriptor, handler));
        Ok(())
    }

    pub fn freeze(self) -> ToolRegistry {
        let entries: HashMap<String, (ToolDescriptor, ToolHandler)> = self
            .entries
            .into_iter()
            .map(|(d, h)| (d.name.to_string(), (d, h)))
            .collect();
        log::info!("Tool registry frozen with {} tools", entries.len());
        ToolRegistry { entries }
    }
}

/// Immutable name → tool lookup. There is no mutation API: registrations end
/// when `RegistryBuilder::freeze` runs.
pub struct ToolRegistry {
    entries: HashMap<String, (ToolDescriptor, ToolHandler)>,
}

impl ToolRegistry {
    /// The full built-in catalog: fifteen primitives plus the two composed
    /// tools the planner may call.
    pub fn builtin() -> Result<Self> {
        let mut builder = RegistryBuilder::new();
        for descriptor in TOOL_CATALOG {
            let handler = builtin_handler(descriptor.name)?;
            builder.register(*descriptor, handler)?;
        }
        Ok(builder.freeze())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.entries.get(name).map(|(d, _)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatch one call. Unknown tools and schema rejections surface as
    /// errors; everything else lands in the `ToolResult` status.
    pub async fn invoke(
        &self,
        toolbox: &Arc<Toolbox>,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult> {
        let (_, handler) = self
            .entries
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        handler(Arc::clone(toolbox), arguments).await
    }
}

fn builtin_handler(name: &str) -> Result<ToolHandler> {
    let handler = match name {
        "search_code" => typed_handler("search_code", composed::search_code),
        "read_code" => typed_handler("read_code", composed::read_code),
        "read_file" => typed_handler("read_file", primitives::read_file),
        "glob_files" => typed_handler("glob_files", primitives::glob_files),
        "grep_search" => typed_handler("grep_search", primitives::grep_search),
        "tree" => typed_handler("tree", primitives::tree),
        "find_symbol" => typed_handler("find_symbol", primitives::find_symbol),
        "get_file_symbols" => typed_handler("get_file_symbols", primitives::get_file_symbols),
        "get_imports" => typed_handler("get_imports", primitives::get_imports),
        "get_importers" => typed_handler("get_importers", primitives::get_importers),
        "semantic_search" => typed_handler("semantic_search", primitives::semantic_search),
        "find_similar_files" => typed_handler("find_similar_files", primitives::find_similar_files),
        "git_log" => typed_handler("git_log", primitives::git_log),
        "git_blame" => typed_handler("git_blame", primitives::git_blame),
        "git_diff" => typed_handler("git_diff", primitives::git_diff),
        "git_status" => typed_handler("git_status", primitives::git_status),
        "list_tools" => typed_handler("list_tools", primitives::list_tools),
        other => return Err(ToolError::UnknownTool(other.to_string())),
    };
    Ok(handler)
}
