use crate::error::Result;
use crate::registry::Toolbox;
use analyst_protocol::{Citation, ToolResult};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SemanticSearchArgs {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub scope: Option<String>,
}

pub async fn semantic_search(toolbox: Arc<Toolbox>, args: SemanticSearchArgs) -> Result<ToolResult> {
    let limit = args.limit.unwrap_or(10).clamp(1, 50);
    let hits = toolbox
        .index
        .semantic_search(&args.query, limit, args.scope.as_deref());

    if hits.is_empty() {
        return Ok(ToolResult::not_found(
            "semantic_search",
            json!({ "query": args.query, "matches": [] }),
        ));
    }

    let matches: Vec<serde_json::Value> = hits
        .iter()
        .map(|h| {
            json!({
                "path": h.path,
                "line": h.line,
                "score": h.score,
                "snippet": h.snippet,
            })
        })
        .collect();
    let citations: Vec<Citation> = hits
        .iter()
        .map(|h| Citation::new(h.path.clone(), h.line))
        .collect();

    let match_count = matches.len();
    Ok(ToolResult::success(
        "semantic_search",
        json!({ "query": args.query, "matches": matches, "match_count": match_count }),
    )
    .with_citations(citations))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FindSimilarFilesArgs {
    pub path: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn find_similar_files(
    toolbox: Arc<Toolbox>,
    args: FindSimilarFilesArgs,
) -> Result<ToolResult> {
    let limit = args.limit.unwrap_or(5).clamp(1, 20);
    let hits = toolbox.index.find_similar_files(&args.path, limit);

    if hits.is_empty() {
        return Ok(ToolResult::not_found(
            "find_similar_files",
            json!({ "path": args.path, "matches": [] }),
        ));
    }

    let matches: Vec<serde_json::Value> = hits
        .iter()
        .map(|h| json!({ "path": h.path, "line": h.line, "score": h.score }))
        .collect();

    let match_count = matches.len();
    Ok(ToolResult::success(
        "find_similar_files",
        json!({ "path": args.path, "matches": matches, "match_count": match_count }),
    ))
}
