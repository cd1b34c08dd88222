use crate::error::Result;
use crate::glob::matches_file_pattern;
use crate::registry::Toolbox;
use analyst_protocol::{estimate_tokens, Citation, ToolResult};
use regex::RegexBuilder;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReadFileArgs {
    pub path: String,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
}

pub async fn read_file(toolbox: Arc<Toolbox>, args: ReadFileArgs) -> Result<ToolResult> {
    let slice = match toolbox
        .files
        .read_slice(&args.path, args.start_line, args.end_line)
        .await
    {
        Ok(slice) => slice,
        Err(analyst_store::StoreError::FileNotFound(_)) => {
            return Ok(ToolResult::not_found(
                "read_file",
                json!({ "path": args.path }),
            ));
        }
        Err(err) => return Ok(ToolResult::error("read_file", err.to_string())),
    };

    let (content, truncated) =
        truncate_to_tokens(&slice.content, toolbox.bounds.max_file_slice_tokens);
    let citation = Citation::new(slice.path.clone(), slice.start_line);

    Ok(ToolResult::success(
        "read_file",
        json!({
            "path": slice.path,
            "start_line": slice.start_line,
            "end_line": slice.end_line,
            "total_lines": slice.total_lines,
            "content": content,
            "truncated": truncated,
        }),
    )
    .with_citations(vec![citation]))
}

/// Trim a slice to the per-file token cap, cutting on line boundaries.
pub(crate) fn truncate_to_tokens(content: &str, max_tokens: usize) -> (String, bool) {
    if estimate_tokens(content) <= max_tokens {
        return (content.to_string(), false);
    }
    let mut kept = String::new();
    for line in content.lines() {
        if estimate_tokens(&kept) + estimate_tokens(line) > max_tokens {
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
    }
    (kept, true)
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GlobFilesArgs {
    pub pattern: String,
    #[serde(default)]
    pub scope: Option<String>,
}

pub async fn glob_files(toolbox: Arc<Toolbox>, args: GlobFilesArgs) -> Result<ToolResult> {
    let cap = toolbox.bounds.max_grep_results;
    let mut files: Vec<&String> = toolbox
        .index
        .files()
        .iter()
        .filter(|f| {
            args.scope
                .as_deref()
                .is_none_or(|prefix| f.starts_with(prefix))
        })
        .filter(|f| matches_file_pattern(f, &args.pattern))
        .collect();
    let truncated = files.len() > cap;
    files.truncate(cap);

    if files.is_empty() {
        return Ok(ToolResult::not_found(
            "glob_files",
            json!({ "pattern": args.pattern, "files": [], "file_count": 0 }),
        ));
    }

    let file_count = files.len();
    Ok(ToolResult::success(
        "glob_files",
        json!({
            "pattern": args.pattern,
            "files": files,
            "file_count": file_count,
            "truncated": truncated,
        }),
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GrepSearchArgs {
    pub pattern: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub max_results: Option<usize>,
}

fn default_case_sensitive() -> bool {
    true
}

pub async fn grep_search(toolbox: Arc<Toolbox>, args: GrepSearchArgs) -> Result<ToolResult> {
    let regex = match RegexBuilder::new(&args.pattern)
        .case_insensitive(!args.case_sensitive)
        .build()
    {
        Ok(regex) => regex,
        Err(err) => {
            return Ok(ToolResult::error(
                "grep_search",
                format!("invalid pattern: {err}"),
            ));
        }
    };

    let cap = args
        .max_results
        .unwrap_or(toolbox.bounds.max_grep_results)
        .min(toolbox.bounds.max_grep_results);

    let mut matches = Vec::new();
    let mut citations = Vec::new();
    let mut truncated = false;

    'files: for path in toolbox.index.files() {
        if args
            .scope
            .as_deref()
            .is_some_and(|prefix| !path.starts_with(prefix))
        {
            continue;
        }
        let slice = match toolbox.files.read_slice(path, None, None).await {
            Ok(slice) => slice,
            Err(err) => {
                log::debug!("grep skipped {path}: {err}");
                continue;
            }
        };
        for (idx, line) in slice.content.lines().enumerate() {
            if regex.is_match(line) {
                if matches.len() >= cap {
                    truncated = true;
                    break 'files;
                }
                let line_no = idx + 1;
                matches.push(json!({
                    "path": path,
                    "line": line_no,
                    "text": line.trim_end().chars().take(200).collect::<String>(),
                }));
                citations.push(Citation::new(path.clone(), line_no));
            }
        }
    }

    if matches.is_empty() {
        return Ok(ToolResult::not_found(
            "grep_search",
            json!({ "pattern": args.pattern, "matches": [], "match_count": 0 }),
        ));
    }

    let match_count = matches.len();
    Ok(ToolResult::success(
        "grep_search",
        json!({
            "pattern": args.pattern,
            "case_sensitive": args.case_sensitive,
            "matches": matches,
            "match_count": match_count,
            "truncated": truncated,
        }),
    )
    .with_citations(citations))
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TreeArgs {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

pub async fn tree(toolbox: Arc<Toolbox>, args: TreeArgs) -> Result<ToolResult> {
    let depth = args
        .max_depth
        .unwrap_or(toolbox.bounds.max_tree_depth)
        .min(toolbox.bounds.max_tree_depth)
        .max(1);

    match toolbox.files.tree(args.path.as_deref(), depth) {
        Ok(listing) => Ok(ToolResult::success(
            "tree",
            serde_json::to_value(&listing).unwrap_or_default(),
        )),
        Err(err) => Ok(ToolResult::error("tree", err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_token_cap() {
        let content = "line one\n".repeat(100);
        let (kept, truncated) = truncate_to_tokens(&content, 10);
        assert!(truncated);
        assert!(estimate_tokens(&kept) <= 10);
        assert!(kept.starts_with("line one"));

        let (all, truncated) = truncate_to_tokens("short", 10);
        assert!(!truncated);
        assert_eq!(all, "short");
    }
}
