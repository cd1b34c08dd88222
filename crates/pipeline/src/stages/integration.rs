use analyst_protocol::{
    CitationSet, Envelope, IntegrationOutput, TerminationReason, ToolStatus,
};
use std::fmt::Write as _;

/// Build the final response. Purely templated: the inline-citation format and
/// the qualification of unverified statements are guaranteed, not prompted
/// for.
pub(crate) fn build(
    envelope: &Envelope,
    pending_reason: Option<TerminationReason>,
    clarification: Option<&str>,
) -> IntegrationOutput {
    if let Some(question) = clarification {
        return IntegrationOutput {
            final_response: question.to_string(),
            cited_sources: Vec::new(),
        };
    }

    let unsupported: Vec<String> = envelope
        .critic()
        .map(|c| c.unsupported_claims.clone())
        .unwrap_or_default();
    let claims = envelope
        .synthesizer()
        .map(|s| s.claims.clone())
        .unwrap_or_default();

    let mut cited = CitationSet::new();
    let mut body = String::new();

    match pending_reason {
        Some(TerminationReason::QuotaExceeded) => {
            let _ = writeln!(
                body,
                "The exploration budget for this request was exhausted before the analysis \
                 completed. Findings below cover only the evidence gathered so far."
            );
            body.push('\n');
        }
        Some(TerminationReason::CriticRejected) => {
            let _ = writeln!(
                body,
                "Some statements could not be verified against the repository within the \
                 analysis budget; they are marked as unverified."
            );
            body.push('\n');
        }
        _ => {}
    }

    if claims.is_empty() {
        write_no_evidence_response(envelope, &mut body);
    } else {
        for claim in &claims {
            let is_unverified = unsupported.contains(&claim.text);
            if is_unverified {
                let _ = write!(body, "Unverified: {}", claim.text);
            } else {
                let _ = write!(body, "{}", claim.text);
            }
            for citation in &claim.supporting_citations {
                cited.insert(citation.clone());
                let _ = write!(body, " [{citation}]");
            }
            body.push('\n');
        }
    }

    if !cited.is_empty() {
        body.push('\n');
        body.push_str("Sources:\n");
        for citation in cited.iter() {
            let _ = writeln!(body, "- {citation}");
        }
    }

    IntegrationOutput {
        final_response: body.trim_end().to_string(),
        cited_sources: cited.to_vec(),
    }
}

/// No claims survived: either a lookup legitimately found nothing, or the
/// evidence never materialized. Name the miss and list the candidates the
/// tools actually returned, citing nothing.
fn write_no_evidence_response(envelope: &Envelope, body: &mut String) {
    let results = envelope
        .executor()
        .map(|e| e.results.as_slice())
        .unwrap_or_default();

    // A failed read names the missing file; a failed search only names the
    // query, so the read takes precedence when both are present.
    if let Some(result) = results
        .iter()
        .find(|r| r.status == ToolStatus::NotFound && r.tool == "read_code")
    {
        let path = result
            .data
            .get("path")
            .and_then(|p| p.as_str())
            .unwrap_or("the requested file");
        let _ = write!(body, "No file named {path} was found in the repository.");
        let suggestions: Vec<&str> = result
            .data
            .get("suggestions")
            .and_then(|s| s.as_array())
            .map(|items| items.iter().filter_map(|i| i.as_str()).collect())
            .unwrap_or_default();
        if suggestions.is_empty() {
            body.push('\n');
        } else {
            let _ = writeln!(body, " Closest candidates: {}.", suggestions.join(", "));
        }
        return;
    }

    if let Some(result) = results
        .iter()
        .find(|r| r.status == ToolStatus::NotFound && r.tool == "search_code")
    {
        let query = result
            .data
            .get("query")
            .and_then(|q| q.as_str())
            .unwrap_or("the query");
        let _ = writeln!(
            body,
            "No code matching '{query}' was found after exhausting every search strategy."
        );
        return;
    }

    let _ = writeln!(
        body,
        "No cited evidence was found for this query; no claims can be made."
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_protocol::{
        Citation, Claim, CriticOutput, CriticVerdict, ExecutorOutput, StageOutput,
        SynthesizerOutput, ToolResult,
    };
    use serde_json::json;

    #[test]
    fn claims_render_with_inline_citations_and_sources() {
        let mut env = Envelope::new("r1", None, "where is login?");
        env.set_output(StageOutput::Synthesizer(SynthesizerOutput {
            claims: vec![Claim {
                text: "`login` is defined in `src/auth/login.py`".to_string(),
                supporting_citations: vec![Citation::new("src/auth/login.py", 42)],
            }],
        }));

        let output = build(&env, None, None);
        assert!(output.final_response.contains("[src/auth/login.py:42]"));
        assert!(output.final_response.contains("Sources:"));
        assert_eq!(output.cited_sources.len(), 1);
    }

    #[test]
    fn rejected_requests_mark_unverified_claims() {
        let mut env = Envelope::new("r1", None, "explain errors");
        env.set_output(StageOutput::Synthesizer(SynthesizerOutput {
            claims: vec![Claim {
                text: "errors are retried".to_string(),
                supporting_citations: Vec::new(),
            }],
        }));
        env.set_output(StageOutput::Critic(CriticOutput {
            verdict: CriticVerdict::Reject,
            unsupported_claims: vec!["errors are retried".to_string()],
            missing_evidence: Vec::new(),
            reason: "no citations".to_string(),
            suggested_reintent_focus: None,
        }));

        let output = build(&env, Some(TerminationReason::CriticRejected), None);
        assert!(output.final_response.contains("Unverified: errors are retried"));
        assert!(output.final_response.contains("marked as unverified"));
    }

    #[test]
    fn missing_files_name_the_candidates_without_citations() {
        let mut env = Envelope::new("r1", None, "show nonexistent.py");
        env.set_output(StageOutput::Executor(ExecutorOutput {
            results: vec![ToolResult::not_found(
                "read_code",
                json!({ "path": "nonexistent.py", "suggestions": ["src/existing.py"] }),
            )],
        }));
        env.set_output(StageOutput::Synthesizer(SynthesizerOutput::default()));

        let output = build(&env, None, None);
        assert!(output
            .final_response
            .contains("No file named nonexistent.py was found"));
        assert!(output.final_response.contains("src/existing.py"));
        assert!(output.cited_sources.is_empty());
    }

    #[test]
    fn clarifications_pass_straight_through() {
        let env = Envelope::new("r1", None, "");
        let output = build(&env, None, Some("What would you like to know?"));
        assert_eq!(output.final_response, "What would you like to know?");
    }
}
