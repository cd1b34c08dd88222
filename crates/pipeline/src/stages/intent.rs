use crate::llm::extract_json;
use analyst_protocol::{ClassifiedIntent, IntentOutput};
use serde::Deserialize;

#[derive(Deserialize)]
struct RawIntent {
    intent: String,
    #[serde(default)]
    goals: Vec<String>,
    #[serde(default)]
    ambiguities: Vec<String>,
    #[serde(default)]
    clarification_needed: bool,
    #[serde(default)]
    clarification_question: Option<String>,
}

fn classify(raw: &str) -> Option<ClassifiedIntent> {
    match raw {
        "find_symbol" | "find_definition" | "find" => Some(ClassifiedIntent::FindSymbol),
        "trace_flow" | "trace" => Some(ClassifiedIntent::TraceFlow),
        "explain" | "explain_code" => Some(ClassifiedIntent::Explain),
        "search" | "locate" => Some(ClassifiedIntent::Search),
        "history" | "git_history" => Some(ClassifiedIntent::History),
        _ => None,
    }
}

/// Parse the intent completion. `query_is_empty` gates the exploration-first
/// policy: a non-empty query with workable goals never stalls on
/// clarification.
pub(crate) fn parse(text: &str, query_is_empty: bool) -> Result<IntentOutput, String> {
    let json = extract_json(text).ok_or_else(|| "no JSON object in output".to_string())?;
    let raw: RawIntent = serde_json::from_str(json).map_err(|e| e.to_string())?;

    let classified_intent =
        classify(raw.intent.trim()).ok_or_else(|| format!("unknown intent '{}'", raw.intent))?;

    let clarification_required = raw.clarification_needed && (query_is_empty || raw.goals.is_empty());

    Ok(IntentOutput {
        classified_intent,
        goals: raw.goals,
        ambiguities: raw.ambiguities,
        clarification_required,
        clarification_question: if clarification_required {
            raw.clarification_question
                .or_else(|| Some("What would you like to know about this repository?".to_string()))
        } else {
            None
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_intent() {
        let output = parse(
            r#"{"intent": "find_symbol", "goals": ["Locate login"]}"#,
            false,
        )
        .expect("parse");
        assert_eq!(output.classified_intent, ClassifiedIntent::FindSymbol);
        assert_eq!(output.goals, vec!["Locate login"]);
        assert!(!output.clarification_required);
    }

    #[test]
    fn exploration_first_overrides_idle_clarification() {
        let output = parse(
            r#"{"intent": "explain", "goals": ["Understand errors"], "clarification_needed": true,
                "clarification_question": "which errors?"}"#,
            false,
        )
        .expect("parse");
        assert!(!output.clarification_required);
        assert!(output.clarification_question.is_none());
    }

    #[test]
    fn empty_queries_may_request_clarification() {
        let output = parse(
            r#"{"intent": "search", "goals": [], "clarification_needed": true}"#,
            true,
        )
        .expect("parse");
        assert!(output.clarification_required);
        assert!(output.clarification_question.is_some());
    }

    #[test]
    fn unknown_intents_are_malformed() {
        assert!(parse(r#"{"intent": "rewrite", "goals": []}"#, false).is_err());
        assert!(parse("not json at all", false).is_err());
    }
}
