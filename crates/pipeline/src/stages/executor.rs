use crate::accountant::ResourceAccountant;
use crate::error::Result;
use analyst_protocol::{
    estimate_tokens, Envelope, ExecutorOutput, StageOutput, ToolResult, ToolStatus,
};
use analyst_tools::{extract_citations, ToolError, ToolRegistry, Toolbox};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) struct ExecutorRun {
    pub cancelled: bool,
    /// Set when a context bound tripped mid-plan.
    pub quota_reason: Option<String>,
}

/// Run the plan in order. `not_found` is a normal signal and never stops the
/// plan; an unregistered tool marks its step and continues; schema rejections
/// are fatal to the request. Cancellation finishes the in-flight call, then
/// stops.
pub(crate) async fn run(
    envelope: &mut Envelope,
    registry: &Arc<ToolRegistry>,
    toolbox: &Arc<Toolbox>,
    accountant: &Arc<dyn ResourceAccountant>,
    cancel: &CancellationToken,
) -> Result<ExecutorRun> {
    let steps = envelope
        .planner()
        .map(|p| p.steps.clone())
        .unwrap_or_default();

    let mut output = ExecutorOutput::default();
    let mut cancelled = false;
    let mut quota_reason = None;
    let mut files_read: HashSet<String> = HashSet::new();
    let bounds = toolbox.bounds;

    for step in steps {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let tool_name = step.tool.as_str();
        accountant.record_tool_call(&envelope.request_id, tool_name);
        envelope.resource_usage.tool_calls += 1;

        let mut result = match registry
            .invoke(toolbox, tool_name, step.arguments.clone())
            .await
        {
            Ok(result) => result,
            Err(ToolError::UnknownTool(name)) => {
                log::warn!("planned tool '{name}' is unavailable");
                output.results.push(ToolResult::unavailable(name));
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        result.citations = extract_citations(&result);
        envelope.record_tool_result(&result);
        envelope.resource_usage.code_tokens += evidence_tokens(&result);

        if result.status == ToolStatus::Success {
            if let Some(path) = read_path(&result) {
                if files_read.insert(path.clone()) && !envelope.explored_files.contains(&path) {
                    envelope.explored_files.push(path);
                }
            }
        }

        output.results.push(result);

        if files_read.len() > bounds.max_files_per_query {
            quota_reason = Some(format!(
                "file budget exhausted ({}/{})",
                files_read.len(),
                bounds.max_files_per_query
            ));
            break;
        }
        if envelope.resource_usage.code_tokens > bounds.max_total_code_tokens {
            quota_reason = Some(format!(
                "code token budget exhausted ({}/{})",
                envelope.resource_usage.code_tokens, bounds.max_total_code_tokens
            ));
            break;
        }
    }

    envelope.set_output(StageOutput::Executor(output));
    Ok(ExecutorRun {
        cancelled,
        quota_reason,
    })
}

/// Tokens of code evidence a result adds to the context budget.
fn evidence_tokens(result: &ToolResult) -> u64 {
    let mut tokens = 0usize;
    if let Some(content) = result.data.get("content").and_then(|c| c.as_str()) {
        tokens += estimate_tokens(content);
    }
    if let Some(matches) = result.data.get("matches").and_then(|m| m.as_array()) {
        for entry in matches {
            if let Some(text) = entry
                .get("text")
                .or_else(|| entry.get("snippet"))
                .and_then(|t| t.as_str())
            {
                tokens += estimate_tokens(text);
            }
        }
    }
    tokens as u64
}

fn read_path(result: &ToolResult) -> Option<String> {
    if result.tool != "read_code" && result.tool != "read_file" {
        return None;
    }
    result
        .data
        .get("resolved_path")
        .or_else(|| result.data.get("path"))
        .and_then(|p| p.as_str())
        .map(str::to_string)
}
