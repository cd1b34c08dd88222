use analyst_protocol::{Envelope, ToolResult};
use analyst_tools::{ToolDescriptor, PLANNABLE_TOOLS, TOOL_CATALOG};
use std::fmt::Write as _;

/// Snippet extraction caps. These keep every stage prompt bounded no matter
/// how much a tool returned.
pub const MAX_SNIPPET_CHARS: usize = 512;
pub const MAX_ITEMS_PER_TOOL: usize = 10;

const SYSTEM_IDENTITY: &str = "You are a read-only code analysis agent. Every factual statement \
must be backed by a path:line citation observed in tool output. Never invent paths or lines.";

/// Compress one tool result into a bounded block for LLM input.
pub fn summarize_tool_result(result: &ToolResult) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "tool={} status={:?}",
        result.tool,
        result.status
    );
    if let Some(via) = &result.found_via {
        let _ = write!(out, " found_via={via}");
    }
    out.push('\n');

    if let Some(content) = result.data.get("content").and_then(|c| c.as_str()) {
        let snippet: String = content.chars().take(MAX_SNIPPET_CHARS).collect();
        let _ = writeln!(out, "  {}", snippet.replace('\n', "\n  "));
    }

    if let Some(matches) = result.data.get("matches").and_then(|m| m.as_array()) {
        for entry in matches.iter().take(MAX_ITEMS_PER_TOOL) {
            let path = entry.get("path").and_then(|p| p.as_str()).unwrap_or("?");
            let line = entry.get("line").and_then(|l| l.as_u64()).unwrap_or(0);
            let text = entry
                .get("text")
                .or_else(|| entry.get("snippet"))
                .or_else(|| entry.get("symbol"))
                .and_then(|t| t.as_str())
                .unwrap_or("");
            let text: String = text.chars().take(MAX_SNIPPET_CHARS).collect();
            let _ = writeln!(out, "  {path}:{line} {text}");
        }
        let total = matches.len();
        if total > MAX_ITEMS_PER_TOOL {
            let _ = writeln!(out, "  ... {} more matches omitted", total - MAX_ITEMS_PER_TOOL);
        }
    }

    if let Some(candidates) = result.data.get("candidates").and_then(|c| c.as_array()) {
        for entry in candidates.iter().take(MAX_ITEMS_PER_TOOL) {
            if let Some(path) = entry.as_str() {
                let _ = writeln!(out, "  candidate: {path}");
            }
        }
    }

    if let Some(suggestions) = result.data.get("suggestions").and_then(|s| s.as_array()) {
        for entry in suggestions.iter().take(MAX_ITEMS_PER_TOOL) {
            if let Some(path) = entry.as_str() {
                let _ = writeln!(out, "  suggestion: {path}");
            }
        }
    }

    if let Some(error) = &result.error {
        let _ = writeln!(out, "  error: {error}");
    }

    out
}

fn executor_summary(envelope: &Envelope) -> String {
    let Some(executor) = envelope.executor() else {
        return String::new();
    };
    executor
        .results
        .iter()
        .map(summarize_tool_result)
        .collect::<Vec<_>>()
        .join("\n")
}

fn goals_block(envelope: &Envelope) -> String {
    let Some(intent) = envelope.intent() else {
        return String::new();
    };
    intent
        .goals
        .iter()
        .map(|g| format!("- {g}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn citations_block(envelope: &Envelope) -> String {
    if envelope.citations().is_empty() {
        return "(none)".to_string();
    }
    envelope
        .citations()
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Intent input: perception output plus any critic refocus hint.
pub fn intent_prompt(envelope: &Envelope) -> String {
    let normalized = envelope
        .perception()
        .map(|p| p.normalized_query.clone())
        .unwrap_or_else(|| envelope.query.clone());
    let digest = envelope
        .perception()
        .map(|p| p.session_context_digest.clone())
        .unwrap_or_default();

    let mut prompt = format!(
        "{SYSTEM_IDENTITY}\n\nRole: Intent\n\nQuery: {normalized}\n\nSession context: {digest}\n"
    );
    if let Some(focus) = &envelope.reintent_focus {
        let _ = writeln!(prompt, "Focus: {focus}");
        let _ = writeln!(
            prompt,
            "A previous pass failed verification; refocus the goals on the hint above."
        );
    }
    prompt.push_str(
        "\nClassify the intent (find_symbol, trace_flow, explain, search, history) and list \
         concrete goals. Ask for clarification only if the query is empty or incomprehensible.\n\
         Output JSON only:\n\
         {\"intent\": \"...\", \"goals\": [\"...\"], \"ambiguities\": [], \
         \"clarification_needed\": false, \"clarification_question\": null}\n",
    );
    prompt
}

/// Planner input: intent, goals, the plannable tool list, and a summary of
/// any executor output from a previous cycle.
pub fn planner_prompt(envelope: &Envelope) -> String {
    let intent = envelope
        .intent()
        .map(|i| i.classified_intent.as_str())
        .unwrap_or("search");
    let normalized = envelope
        .perception()
        .map(|p| p.normalized_query.clone())
        .unwrap_or_else(|| envelope.query.clone());

    let tool_lines: Vec<String> = TOOL_CATALOG
        .iter()
        .filter(|t: &&ToolDescriptor| PLANNABLE_TOOLS.contains(&t.name))
        .map(|t| format!("- {}: {}", t.name, t.summary))
        .collect();

    let mut prompt = format!(
        "{SYSTEM_IDENTITY}\n\nRole: Planner\n\nQuery: {normalized}\nIntent: {intent}\nGoals:\n{}\n",
        goals_block(envelope)
    );
    if let Some(focus) = &envelope.reintent_focus {
        let _ = writeln!(prompt, "Focus: {focus}");
    }
    let prior = executor_summary(envelope);
    if !prior.is_empty() {
        let _ = writeln!(prompt, "\nEarlier tool output:\n{prior}");
    }
    let _ = write!(
        prompt,
        "\nAvailable tools:\n{}\n\nPlan a short sequence of tool calls. Always search before \
         reading a path you have not seen in search results. Each step states the goal it serves.\n\
         Output JSON only:\n\
         {{\"steps\": [{{\"tool\": \"search_code\", \"arguments\": {{\"query\": \"...\"}}, \
         \"rationale\": \"...\"}}]}}\n",
        tool_lines.join("\n")
    );
    prompt
}

/// Synthesizer input: the plan, executor snippets, and the citation pool the
/// claims must draw from.
pub fn synthesizer_prompt(envelope: &Envelope) -> String {
    let normalized = envelope
        .perception()
        .map(|p| p.normalized_query.clone())
        .unwrap_or_else(|| envelope.query.clone());

    format!(
        "{SYSTEM_IDENTITY}\n\nRole: Synthesizer\n\nQuery: {normalized}\nGoals:\n{}\n\n\
         Tool output:\n{}\n\nCitations so far:\n{}\n\n\
         State findings as claims. Every claim must carry at least one citation drawn from the \
         list above. If the evidence is insufficient, return an empty claims list.\n\
         Output JSON only:\n\
         {{\"claims\": [{{\"text\": \"...\", \"citations\": [\"path:line\"]}}]}}\n",
        goals_block(envelope),
        executor_summary(envelope),
        citations_block(envelope)
    )
}

/// Critic input: the claims and the literal accumulated citation list, so the
/// verdict can be checked without any other context.
pub fn critic_prompt(envelope: &Envelope) -> String {
    let claims = envelope
        .synthesizer()
        .map(|s| serde_json::to_string_pretty(&s.claims).unwrap_or_default())
        .unwrap_or_else(|| "[]".to_string());

    format!(
        "{SYSTEM_IDENTITY}\n\nRole: Critic\n\nClaims under review:\n{claims}\n\n\
         Observed citations (the only admissible evidence):\n{}\n\n\
         Approve only if every claim cites observed evidence. Reject with the unsupported claims \
         listed and suggest a refocus hint. Use clarify only when the query itself cannot be \
         answered from a repository.\n\
         Output JSON only:\n\
         {{\"verdict\": \"approve\", \"unsupported_claims\": [], \"missing_evidence\": [], \
         \"reason\": \"...\", \"suggested_reintent_focus\": null}}\n",
        citations_block(envelope)
    )
}
