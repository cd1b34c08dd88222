use crate::error::Result;
use crate::registry::Toolbox;
use analyst_protocol::{Citation, ToolResult};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GitLogArgs {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub max_count: Option<usize>,
}

pub async fn git_log(toolbox: Arc<Toolbox>, args: GitLogArgs) -> Result<ToolResult> {
    match toolbox
        .git
        .log(args.path.as_deref(), args.max_count.unwrap_or(20))
        .await
    {
        Ok(output) if output.trim().is_empty() => Ok(ToolResult::not_found(
            "git_log",
            json!({ "path": args.path, "log": "" }),
        )),
        Ok(output) => Ok(ToolResult::success(
            "git_log",
            json!({ "path": args.path, "log": output }),
        )),
        Err(err) => Ok(ToolResult::error("git_log", err.to_string())),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GitBlameArgs {
    pub path: String,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
}

pub async fn git_blame(toolbox: Arc<Toolbox>, args: GitBlameArgs) -> Result<ToolResult> {
    match toolbox
        .git
        .blame(&args.path, args.start_line, args.end_line)
        .await
    {
        Ok(output) => {
            let citation = Citation::new(args.path.clone(), args.start_line.unwrap_or(1));
            Ok(ToolResult::success(
                "git_blame",
                json!({ "path": args.path, "blame": output }),
            )
            .with_citations(vec![citation]))
        }
        Err(err) => Ok(ToolResult::error("git_blame", err.to_string())),
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GitDiffArgs {
    #[serde(default)]
    pub spec: Option<String>,
}

pub async fn git_diff(toolbox: Arc<Toolbox>, args: GitDiffArgs) -> Result<ToolResult> {
    match toolbox.git.diff(args.spec.as_deref()).await {
        Ok(output) if output.trim().is_empty() => Ok(ToolResult::not_found(
            "git_diff",
            json!({ "spec": args.spec, "diff": "" }),
        )),
        Ok(output) => Ok(ToolResult::success(
            "git_diff",
            json!({ "spec": args.spec, "diff": output }),
        )),
        Err(err) => Ok(ToolResult::error("git_diff", err.to_string())),
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GitStatusArgs {}

pub async fn git_status(toolbox: Arc<Toolbox>, _args: GitStatusArgs) -> Result<ToolResult> {
    match toolbox.git.status().await {
        Ok(output) => Ok(ToolResult::success(
            "git_status",
            json!({ "status": output }),
        )),
        Err(err) => Ok(ToolResult::error("git_status", err.to_string())),
    }
}
