use crate::llm::{Completion, CompletionOptions, LlmClient, LlmError};
use analyst_protocol::estimate_tokens;
use async_trait::async_trait;
use serde_json::json;

/// Deterministic keyword-driven stand-in for the completion backend.
///
/// Classifies intent by query phrasing, plans a search-first exploration, and
/// synthesizes claims from the citations present in its prompt. Powers the
/// offline CLI; behaviour-sensitive tests use a scripted client instead.
#[derive(Default)]
pub struct HeuristicLlm;

impl HeuristicLlm {
    pub fn new() -> Self {
        Self
    }

    fn answer(&self, prompt: &str) -> String {
        if prompt.contains("Role: Intent") {
            intent_answer(prompt)
        } else if prompt.contains("Role: Planner") {
            planner_answer(prompt)
        } else if prompt.contains("Role: Synthesizer") {
            synthesizer_answer(prompt)
        } else if prompt.contains("Role: Critic") {
            json!({
                "verdict": "approve",
                "unsupported_claims": [],
                "missing_evidence": [],
                "reason": "claims cite observed evidence",
            })
            .to_string()
        } else {
            json!({}).to_string()
        }
    }
}

#[async_trait]
impl LlmClient for HeuristicLlm {
    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let text = self.answer(prompt);
        Ok(Completion {
            tokens_in: estimate_tokens(prompt) as u64,
            tokens_out: estimate_tokens(&text) as u64,
            text,
        })
    }
}

fn prompt_field<'a>(prompt: &'a str, label: &str) -> Option<&'a str> {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(label))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn is_low_value(token: &str) -> bool {
    matches!(
        token,
        "where" | "what" | "when" | "does" | "show" | "find" | "the" | "this" | "that" | "file"
            | "code" | "defined" | "definition" | "function" | "class" | "struct" | "contents"
            | "explain" | "how" | "are" | "is" | "of" | "in" | "handled" | "with" | "work"
            | "works" | "from"
    )
}

fn choose_anchor(query: &str) -> Option<String> {
    query
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .map(str::trim)
        .filter(|t| t.len() >= 4)
        .filter(|t| !is_low_value(&t.to_lowercase()))
        .max_by_key(|t| t.len())
        .map(|t| t.to_string())
}

fn file_token(query: &str) -> Option<String> {
    query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '?' | ',' | ';')))
        .find(|t| {
            [".rs", ".py", ".pyi", ".js", ".jsx", ".ts", ".tsx"]
                .iter()
                .any(|ext| t.ends_with(ext))
        })
        .map(str::to_string)
}

fn intent_answer(prompt: &str) -> String {
    let query = prompt_field(prompt, "Query:").unwrap_or_default();
    if query.is_empty() {
        return json!({
            "intent": "search",
            "goals": [],
            "clarification_needed": true,
            "clarification_question": "What would you like to know about this repository?",
        })
        .to_string();
    }

    let lower = query.to_lowercase();
    let intent = if ["flow", "trace", "call"].iter().any(|k| lower.contains(k)) {
        "trace_flow"
    } else if ["history", "blame", "changed", "commit"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "history"
    } else if ["where", "find", "defined", "definition", "show", "contents"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "find_symbol"
    } else if ["explain", "how", "what does", "why"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "explain"
    } else {
        "search"
    };

    let goal = match file_token(query).or_else(|| choose_anchor(query)) {
        Some(anchor) => format!("Locate `{anchor}` and gather cited evidence"),
        None => "Explore the repository for relevant code".to_string(),
    };

    json!({ "intent": intent, "goals": [goal], "ambiguities": [] }).to_string()
}

fn planner_answer(prompt: &str) -> String {
    let query = prompt_field(prompt, "Query:").unwrap_or_default();
    let focus = prompt_field(prompt, "Focus:");

    let mut steps = Vec::new();
    if let Some(path) = file_token(query) {
        let stem = path
            .rsplit('/')
            .next()
            .and_then(|n| n.rsplit_once('.').map(|(s, _)| s))
            .unwrap_or(&path)
            .to_string();
        steps.push(json!({
            "tool": "search_code",
            "arguments": { "query": stem },
            "rationale": format!("locate code related to {path}"),
        }));
        steps.push(json!({
            "tool": "read_code",
            "arguments": { "path": path },
            "rationale": "read the requested file",
        }));
    } else {
        let anchor = focus
            .map(str::to_string)
            .or_else(|| choose_anchor(query))
            .unwrap_or_else(|| query.to_string());
        steps.push(json!({
            "tool": "search_code",
            "arguments": { "query": anchor },
            "rationale": format!("find definitions and mentions of '{anchor}'"),
        }));
    }

    json!({ "steps": steps }).to_string()
}

fn synthesizer_answer(prompt: &str) -> String {
    let query = prompt_field(prompt, "Query:").unwrap_or_default();
    let anchor = choose_anchor(query).unwrap_or_else(|| "the requested code".to_string());

    // Citations appear as "- path:line" lines after the pool header.
    let mut citations = Vec::new();
    let mut in_pool = false;
    for line in prompt.lines() {
        if line.starts_with("Citations so far:") {
            in_pool = true;
            continue;
        }
        if in_pool {
            if let Some(rest) = line.strip_prefix("- ") {
                citations.push(rest.trim().to_string());
            } else if !line.trim().is_empty() && !line.starts_with('-') {
                break;
            }
        }
    }

    let claims: Vec<serde_json::Value> = citations
        .iter()
        .take(3)
        .map(|citation| {
            let path = citation.rsplit_once(':').map(|(p, _)| p).unwrap_or(citation);
            json!({
                "text": format!("`{anchor}` is defined in `{path}`"),
                "citations": [citation],
            })
        })
        .collect();

    json!({ "claims": claims }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn intent_classifies_by_phrasing() {
        let llm = HeuristicLlm::new();
        let out = llm
            .complete(
                "Role: Intent\n\nQuery: Where is login defined?\n",
                &CompletionOptions::default(),
            )
            .await
            .expect("complete");
        let parsed: serde_json::Value = serde_json::from_str(&out.text).expect("json");
        assert_eq!(parsed["intent"], "find_symbol");
        assert!(parsed["goals"][0].as_str().expect("goal").contains("login"));
    }

    #[tokio::test]
    async fn planner_searches_before_reading_files() {
        let llm = HeuristicLlm::new();
        let out = llm
            .complete(
                "Role: Planner\n\nQuery: Show contents of nonexistent.py\nIntent: find_symbol\n",
                &CompletionOptions::default(),
            )
            .await
            .expect("complete");
        let parsed: serde_json::Value = serde_json::from_str(&out.text).expect("json");
        assert_eq!(parsed["steps"][0]["tool"], "search_code");
        assert_eq!(parsed["steps"][1]["tool"], "read_code");
        assert_eq!(parsed["steps"][1]["arguments"]["path"], "nonexistent.py");
    }

    #[tokio::test]
    async fn synthesizer_claims_only_observed_citations() {
        let llm = HeuristicLlm::new();
        let prompt = "Role: Synthesizer\n\nQuery: Where is login defined?\n\n\
                      Citations so far:\n- src/auth/login.py:42\n";
        let out = llm
            .complete(prompt, &CompletionOptions::default())
            .await
            .expect("complete");
        let parsed: serde_json::Value = serde_json::from_str(&out.text).expect("json");
        assert_eq!(parsed["claims"][0]["citations"][0], "src/auth/login.py:42");
    }
}
