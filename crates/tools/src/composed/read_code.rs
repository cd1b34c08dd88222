use crate::error::Result;
use crate::primitives::{read_file, ReadFileArgs};
use crate::registry::Toolbox;
use analyst_protocol::{AttemptRecord, ToolResult, ToolStatus};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReadCodeArgs {
    pub path: String,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
}

const EXTENSION_SWAPS: &[(&str, &str)] = &[
    (".py", ".pyi"),
    (".pyi", ".py"),
    (".ts", ".tsx"),
    (".tsx", ".ts"),
    (".js", ".jsx"),
    (".jsx", ".js"),
];

/// Read a file, recovering from near-miss paths:
/// exact path, extension swap, glob by filename, then glob by stem
/// (candidates only, no content). Slices are token-capped by `read_file`.
pub async fn read_code(toolbox: Arc<Toolbox>, args: ReadCodeArgs) -> Result<ToolResult> {
    let requested = args.path.trim().to_string();
    if requested.is_empty() {
        return Ok(ToolResult::error("read_code", "path cannot be empty"));
    }
    if requested.contains(char::is_whitespace) {
        let mut result = ToolResult::error(
            "read_code",
            format!("'{requested}' looks like a search query, not a file path"),
        );
        result.data = json!({
            "suggested_tool": "search_code",
            "suggested_args": { "query": requested },
        });
        return Ok(result);
    }

    let mut attempts: Vec<AttemptRecord> = Vec::new();

    // Strategy 1: exact path.
    if let Some(result) = try_read(
        &toolbox,
        &requested,
        &requested,
        &args,
        1,
        "exact path",
        &mut attempts,
    )
    .await?
    {
        return Ok(result);
    }

    // Strategy 2: sibling extension.
    let mut swapped_any = false;
    for (from, to) in EXTENSION_SWAPS {
        if let Some(stripped) = requested.strip_suffix(from) {
            swapped_any = true;
            let candidate = format!("{stripped}{to}");
            if let Some(result) = try_read(
                &toolbox,
                &candidate,
                &requested,
                &args,
                2,
                "extension swap",
                &mut attempts,
            )
            .await?
            {
                return Ok(result);
            }
            break;
        }
    }
    if !swapped_any {
        attempts.push(
            AttemptRecord::new(2, "extension swap", "not_found")
                .with_params(json!({ "path": requested })),
        );
    }

    // Strategy 3: same filename anywhere in the project.
    let file_name = requested.rsplit('/').next().unwrap_or(&requested);
    let by_name: Vec<String> = toolbox
        .index
        .files()
        .iter()
        .filter(|f| f.rsplit('/').next() == Some(file_name))
        .cloned()
        .collect();

    match by_name.as_slice() {
        [] => {
            attempts.push(
                AttemptRecord::new(3, "glob (filename)", "not_found")
                    .with_params(json!({ "pattern": format!("**/{file_name}") })),
            );
        }
        [single] => {
            let single = single.clone();
            if let Some(result) = try_read(
                &toolbox,
                &single,
                &requested,
                &args,
                3,
                "glob (filename)",
                &mut attempts,
            )
            .await?
            {
                return Ok(result);
            }
        }
        many => {
            attempts.push(
                AttemptRecord::new(3, "glob (filename)", "success")
                    .with_params(json!({ "pattern": format!("**/{file_name}") })),
            );
            return Ok(ToolResult::success(
                "read_code",
                json!({
                    "path": requested,
                    "candidates": many,
                    "candidate_count": many.len(),
                }),
            )
            .with_found_via("glob (filename)")
            .with_attempts(attempts));
        }
    }

    // Strategy 4: same stem with any extension. Candidates only, no content.
    let stem = file_name.rsplit_once('.').map_or(file_name, |(s, _)| s);
    let by_stem: Vec<String> = toolbox
        .index
        .files()
        .iter()
        .filter(|f| {
            let candidate = f.rsplit('/').next().unwrap_or(f);
            let candidate_stem = candidate.rsplit_once('.').map_or(candidate, |(s, _)| s);
            candidate_stem == stem
        })
        .cloned()
        .collect();

    if by_stem.is_empty() {
        attempts.push(
            AttemptRecord::new(4, "glob (stem)", "not_found")
                .with_params(json!({ "stem": stem })),
        );
        let suggestions = closest_files(&toolbox, stem);
        return Ok(ToolResult::not_found(
            "read_code",
            json!({ "path": requested, "suggestions": suggestions }),
        )
        .with_attempts(attempts));
    }

    attempts.push(
        AttemptRecord::new(4, "glob (stem)", "success").with_params(json!({ "stem": stem })),
    );
    let candidate_count = by_stem.len();
    Ok(ToolResult::success(
        "read_code",
        json!({
            "path": requested,
            "candidates": by_stem,
            "candidate_count": candidate_count,
        }),
    )
    .with_found_via("glob (stem)")
    .with_attempts(attempts))
}

/// Run one read attempt. Some(result) means the chain is done.
async fn try_read(
    toolbox: &Arc<Toolbox>,
    candidate: &str,
    requested: &str,
    args: &ReadCodeArgs,
    step: usize,
    strategy: &str,
    attempts: &mut Vec<AttemptRecord>,
) -> Result<Option<ToolResult>> {
    if !toolbox.files.exists(candidate) {
        attempts.push(
            AttemptRecord::new(step, strategy, "not_found")
                .with_params(json!({ "path": candidate })),
        );
        return Ok(None);
    }

    let inner = read_file(
        Arc::clone(toolbox),
        ReadFileArgs {
            path: candidate.to_string(),
            start_line: args.start_line,
            end_line: args.end_line,
        },
    )
    .await?;

    match inner.status {
        ToolStatus::Success => {
            attempts.push(
                AttemptRecord::new(step, strategy, "success")
                    .with_params(json!({ "path": candidate })),
            );
            let mut data = inner.data.clone();
            if let Some(map) = data.as_object_mut() {
                map.insert("path".to_string(), json!(requested));
                map.insert("resolved_path".to_string(), json!(candidate));
            }
            Ok(Some(
                ToolResult::success("read_code", data)
                    .with_found_via(strategy)
                    .with_citations(inner.citations)
                    .with_attempts(std::mem::take(attempts)),
            ))
        }
        _ => {
            let mut record = AttemptRecord::new(step, strategy, "error")
                .with_params(json!({ "path": candidate }));
            record.error = inner.error.clone();
            attempts.push(record);
            Ok(None)
        }
    }
}

/// Loose name-similarity suggestions for the not-found response.
fn closest_files(toolbox: &Arc<Toolbox>, stem: &str) -> Vec<String> {
    let needle = stem.to_lowercase();
    let prefix: String = needle.chars().take(3).collect();
    toolbox
        .index
        .files()
        .iter()
        .filter(|f| {
            let name = f.rsplit('/').next().unwrap_or(f).to_lowercase();
            name.contains(&needle) || (!prefix.is_empty() && name.starts_with(&prefix))
        })
        .take(5)
        .cloned()
        .collect()
}
