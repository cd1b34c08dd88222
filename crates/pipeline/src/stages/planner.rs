use crate::llm::extract_json;
use analyst_protocol::{Envelope, PlanStep, PlannedTool, PlannerOutput};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Deserialize)]
struct RawStep {
    tool: String,
    #[serde(default)]
    arguments: serde_json::Value,
    #[serde(default)]
    rationale: String,
}

pub(crate) fn parse(text: &str) -> Result<PlannerOutput, String> {
    let json = extract_json(text).ok_or_else(|| "no JSON object in output".to_string())?;
    let raw: RawPlan = serde_json::from_str(json).map_err(|e| e.to_string())?;

    let mut steps = Vec::with_capacity(raw.steps.len());
    for step in raw.steps {
        let tool = match step.tool.trim() {
            "search_code" => PlannedTool::SearchCode,
            "read_code" => PlannedTool::ReadCode,
            other => return Err(format!("tool '{other}' is not plannable")),
        };
        steps.push(PlanStep {
            tool,
            arguments: step.arguments,
            rationale: step.rationale,
        });
    }

    Ok(PlannerOutput {
        steps,
        context_budget_remaining: 0,
    })
}

fn file_stem(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .map_or(name, |(stem, _)| stem)
        .to_string()
}

/// Plan discipline: a `read_code` may only target a path already observed in
/// search results, or it must be preceded in the same plan by a `search_code`
/// that can establish it. Violations get a locating search inserted rather
/// than failing the stage.
pub(crate) fn enforce_plan_discipline(envelope: &Envelope, plan: &mut PlannerOutput) {
    let known_paths: HashSet<String> = envelope
        .citations()
        .iter()
        .map(|c| c.path.clone())
        .collect();
    let has_session_context = envelope
        .perception()
        .is_some_and(|p| !p.session_context_digest.is_empty());

    let mut repaired: Vec<PlanStep> = Vec::with_capacity(plan.steps.len());
    let mut search_seen = false;

    for step in plan.steps.drain(..) {
        match step.tool {
            PlannedTool::SearchCode => {
                search_seen = true;
                repaired.push(step);
            }
            PlannedTool::ReadCode => {
                let path = step
                    .arguments
                    .get("path")
                    .and_then(|p| p.as_str())
                    .unwrap_or_default()
                    .to_string();
                if !search_seen && !known_paths.contains(&path) {
                    log::debug!("inserting locating search before read of {path}");
                    repaired.push(PlanStep {
                        tool: PlannedTool::SearchCode,
                        arguments: json!({ "query": file_stem(&path) }),
                        rationale: format!("locate '{path}' before reading it"),
                    });
                    search_seen = true;
                }
                repaired.push(step);
            }
        }
    }

    // Cold path: with no prior evidence and no session context, exploration
    // always opens with a search.
    if !has_session_context
        && known_paths.is_empty()
        && repaired
            .first()
            .is_some_and(|s| s.tool != PlannedTool::SearchCode)
    {
        let query = envelope
            .perception()
            .map(|p| p.normalized_query.clone())
            .unwrap_or_else(|| envelope.query.clone());
        repaired.insert(
            0,
            PlanStep {
                tool: PlannedTool::SearchCode,
                arguments: json!({ "query": query }),
                rationale: "open a cold session with a search".to_string(),
            },
        );
    }

    plan.steps = repaired;
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_protocol::{Citation, ToolResult};

    fn plan_with_read(path: &str) -> PlannerOutput {
        PlannerOutput {
            steps: vec![PlanStep {
                tool: PlannedTool::ReadCode,
                arguments: json!({ "path": path }),
                rationale: "read it".to_string(),
            }],
            context_budget_remaining: 0,
        }
    }

    #[test]
    fn parse_rejects_unplannable_tools() {
        assert!(parse(r#"{"steps": [{"tool": "grep_search", "arguments": {}}]}"#).is_err());
        let plan = parse(
            r#"{"steps": [{"tool": "search_code", "arguments": {"query": "login"},
                "rationale": "find it"}]}"#,
        )
        .expect("parse");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool, PlannedTool::SearchCode);
    }

    #[test]
    fn unestablished_read_gets_a_locating_search() {
        let env = Envelope::new("r1", None, "show main.rs");
        let mut plan = plan_with_read("src/main.rs");
        enforce_plan_discipline(&env, &mut plan);

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].tool, PlannedTool::SearchCode);
        assert_eq!(plan.steps[0].arguments["query"], "main");
        assert_eq!(plan.steps[1].tool, PlannedTool::ReadCode);
    }

    #[test]
    fn established_paths_may_be_read_directly() {
        let mut env = Envelope::new("r1", None, "show main.rs");
        let result = ToolResult::success("search_code", serde_json::Value::Null)
            .with_citations(vec![Citation::new("src/main.rs", 1)]);
        env.record_tool_result(&result);

        let mut plan = plan_with_read("src/main.rs");
        enforce_plan_discipline(&env, &mut plan);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool, PlannedTool::ReadCode);
    }
}
