use crate::error::Result;
use crate::primitives::{find_symbol, grep_search, semantic_search};
use crate::primitives::{FindSymbolArgs, GrepSearchArgs, SemanticSearchArgs};
use crate::registry::Toolbox;
use analyst_protocol::{AttemptRecord, ToolResult, ToolStatus};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchCodeArgs {
    pub query: String,
    #[serde(default)]
    pub scope: Option<String>,
    /// Optional symbol-kind filter applied to index hits (function, struct, ...).
    #[serde(default)]
    pub kind: Option<String>,
}

const SOURCE_EXTENSIONS: &[&str] = &[
    ".rs", ".py", ".pyi", ".js", ".jsx", ".ts", ".tsx", ".go", ".java",
];

fn looks_like_path(query: &str) -> bool {
    let query = query.trim();
    !query.contains(char::is_whitespace)
        && query.contains('/')
        && SOURCE_EXTENSIONS.iter().any(|ext| query.ends_with(ext))
}

/// Locate code with a deterministic fallback chain:
/// exact symbol, partial symbol, case-sensitive grep, case-insensitive grep,
/// then vector similarity. Returns on the first strategy with any result;
/// every attempted strategy lands in the attempt history.
pub async fn search_code(toolbox: Arc<Toolbox>, args: SearchCodeArgs) -> Result<ToolResult> {
    let query = args.query.trim().to_string();
    if query.is_empty() {
        return Ok(ToolResult::error("search_code", "query cannot be empty"));
    }

    // A path-shaped query will never match a symbol name; route the caller
    // to read_code instead of walking a doomed chain.
    if looks_like_path(&query) {
        let mut result = ToolResult::error(
            "search_code",
            format!("'{query}' looks like a file path, not a search query"),
        );
        result.data = json!({
            "suggested_tool": "read_code",
            "suggested_args": { "path": query },
        });
        return Ok(result);
    }

    let scope = args.scope.clone();
    let mut attempts: Vec<AttemptRecord> = Vec::new();

    let strategies: [(&str, StrategyInput); 5] = [
        ("find_symbol (exact)", StrategyInput::SymbolExact),
        ("find_symbol (partial)", StrategyInput::SymbolPartial),
        ("grep_search (case-sensitive)", StrategyInput::GrepSensitive),
        (
            "grep_search (case-insensitive)",
            StrategyInput::GrepInsensitive,
        ),
        ("semantic_search", StrategyInput::Semantic),
    ];

    for (step, (strategy, input)) in strategies.into_iter().enumerate() {
        let result = run_strategy(&toolbox, input, &query, scope.as_deref()).await?;
        let mut record = AttemptRecord::new(step + 1, strategy, outcome_label(&result))
            .with_params(json!({ "query": query.clone(), "scope": scope.clone() }));
        if let Some(error) = &result.error {
            record.error = Some(error.clone());
        }
        attempts.push(record);

        if result.status == ToolStatus::Success {
            let mut matches = result
                .data
                .get("matches")
                .cloned()
                .unwrap_or_else(|| json!([]));
            let mut citations = result.citations.clone();
            if let Some(kind) = args.kind.as_deref() {
                filter_matches_by_kind(&mut matches, &mut citations, kind);
                if matches.as_array().is_some_and(|m| m.is_empty()) {
                    continue;
                }
            }
            let match_count = matches.as_array().map(|m| m.len()).unwrap_or(0);
            return Ok(ToolResult::success(
                "search_code",
                json!({
                    "query": query,
                    "scope": scope,
                    "found_via": strategy,
                    "matches": matches,
                    "match_count": match_count,
                }),
            )
            .with_found_via(strategy)
            .with_citations(citations)
            .with_attempts(attempts));
        }
    }

    Ok(ToolResult::not_found(
        "search_code",
        json!({ "query": query, "scope": scope, "matches": [], "match_count": 0 }),
    )
    .with_attempts(attempts))
}

enum StrategyInput {
    SymbolExact,
    SymbolPartial,
    GrepSensitive,
    GrepInsensitive,
    Semantic,
}

async fn run_strategy(
    toolbox: &Arc<Toolbox>,
    input: StrategyInput,
    query: &str,
    scope: Option<&str>,
) -> Result<ToolResult> {
    let scope = scope.map(str::to_string);
    match input {
        StrategyInput::SymbolExact => {
            find_symbol(
                Arc::clone(toolbox),
                FindSymbolArgs {
                    name: query.to_string(),
                    exact: true,
                    scope,
                },
            )
            .await
        }
        StrategyInput::SymbolPartial => {
            find_symbol(
                Arc::clone(toolbox),
                FindSymbolArgs {
                    name: query.to_string(),
                    exact: false,
                    scope,
                },
            )
            .await
        }
        StrategyInput::GrepSensitive => {
            grep_search(
                Arc::clone(toolbox),
                GrepSearchArgs {
                    pattern: regex::escape(query),
                    scope,
                    case_sensitive: true,
                    max_results: Some(20),
                },
            )
            .await
        }
        StrategyInput::GrepInsensitive => {
            grep_search(
                Arc::clone(toolbox),
                GrepSearchArgs {
                    pattern: regex::escape(query),
                    scope,
                    case_sensitive: false,
                    max_results: Some(20),
                },
            )
            .await
        }
        StrategyInput::Semantic => {
            semantic_search(
                Arc::clone(toolbox),
                SemanticSearchArgs {
                    query: query.to_string(),
                    limit: Some(10),
                    scope,
                },
            )
            .await
        }
    }
}

fn outcome_label(result: &ToolResult) -> &'static str {
    match result.status {
        ToolStatus::Success => "success",
        ToolStatus::NotFound => "not_found",
        ToolStatus::ToolUnavailable => "tool_unavailable",
        ToolStatus::Error => "error",
    }
}

fn filter_matches_by_kind(
    matches: &mut serde_json::Value,
    citations: &mut Vec<analyst_protocol::Citation>,
    kind: &str,
) {
    let Some(items) = matches.as_array() else {
        return;
    };
    let kept: Vec<serde_json::Value> = items
        .iter()
        .filter(|m| {
            m.get("kind")
                .and_then(|k| k.as_str())
                .is_none_or(|k| k.eq_ignore_ascii_case(kind))
        })
        .cloned()
        .collect();
    let kept_keys: Vec<String> = kept
        .iter()
        .filter_map(|m| {
            let path = m.get("path")?.as_str()?;
            let line = m.get("line")?.as_u64()?;
            Some(format!("{path}:{line}"))
        })
        .collect();
    citations.retain(|c| kept_keys.contains(&c.to_string()));
    *matches = serde_json::Value::Array(kept);
}
