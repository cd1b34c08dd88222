mod fs;
mod git;
mod semantic;
mod symbols;

pub use fs::{
    glob_files, grep_search, read_file, tree, GlobFilesArgs, GrepSearchArgs, ReadFileArgs,
    TreeArgs,
};
pub use git::{
    git_blame, git_diff, git_log, git_status, GitBlameArgs, GitDiffArgs, GitLogArgs, GitStatusArgs,
};
pub use semantic::{find_similar_files, semantic_search, FindSimilarFilesArgs, SemanticSearchArgs};
pub use symbols::{
    find_symbol, get_file_symbols, get_importers, get_imports, FileSymbolsArgs, FindSymbolArgs,
    GetImportersArgs, GetImportsArgs,
};

use crate::catalog::catalog_json;
use crate::error::Result;
use crate::registry::Toolbox;
use analyst_protocol::ToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListToolsArgs {}

pub async fn list_tools(_toolbox: Arc<Toolbox>, _args: ListToolsArgs) -> Result<ToolResult> {
    Ok(ToolResult::success("list_tools", catalog_json()))
}
