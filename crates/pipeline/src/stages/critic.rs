use crate::llm::extract_json;
use analyst_protocol::{CriticOutput, CriticVerdict, Envelope};
use serde::Deserialize;

#[derive(Deserialize)]
struct RawCritic {
    verdict: String,
    #[serde(default)]
    unsupported_claims: Vec<String>,
    #[serde(default)]
    missing_evidence: Vec<String>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    suggested_reintent_focus: Option<String>,
}

pub(crate) fn parse(text: &str) -> Result<CriticOutput, String> {
    let json = extract_json(text).ok_or_else(|| "no JSON object in output".to_string())?;
    let raw: RawCritic = serde_json::from_str(json).map_err(|e| e.to_string())?;

    let verdict = match raw.verdict.trim() {
        "approve" | "approved" => CriticVerdict::Approve,
        "reject" | "reintent" => CriticVerdict::Reject,
        "clarify" => CriticVerdict::Clarify,
        other => return Err(format!("unknown verdict '{other}'")),
    };

    Ok(CriticOutput {
        verdict,
        unsupported_claims: raw.unsupported_claims,
        missing_evidence: raw.missing_evidence,
        reason: raw.reason,
        suggested_reintent_focus: raw.suggested_reintent_focus,
    })
}

/// Claims whose citations are not all in the envelope's accumulated citation
/// set. A claim with no citations is unsupported by definition.
pub(crate) fn unsupported_claims(envelope: &Envelope) -> Vec<String> {
    let Some(synthesizer) = envelope.synthesizer() else {
        return Vec::new();
    };
    let observed = envelope.citations();
    synthesizer
        .claims
        .iter()
        .filter(|claim| {
            claim.supporting_citations.is_empty()
                || claim
                    .supporting_citations
                    .iter()
                    .any(|c| !observed.contains(c))
        })
        .map(|claim| claim.text.clone())
        .collect()
}

/// Overlay the deterministic citation check on the model's verdict. The model
/// may reject or ask to clarify on its own, but it can never approve a claim
/// the envelope has no evidence for.
pub(crate) fn validate(envelope: &Envelope, mut output: CriticOutput) -> CriticOutput {
    let unsupported = unsupported_claims(envelope);
    if unsupported.is_empty() {
        return output;
    }

    output.verdict = CriticVerdict::Reject;
    if output.suggested_reintent_focus.is_none() {
        output.suggested_reintent_focus = derive_focus(&unsupported);
    }
    if output.reason.is_empty() {
        output.reason = "claims reference citations that were never observed".to_string();
    }
    output.unsupported_claims = unsupported;
    output
}

/// A refocus hint from the first unsupported claim: its longest identifier-
/// looking token.
fn derive_focus(unsupported: &[String]) -> Option<String> {
    let first = unsupported.first()?;
    first
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 4)
        .max_by_key(|t| t.len())
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_protocol::{Citation, Claim, StageOutput, SynthesizerOutput, ToolResult};

    fn envelope_with_claims(claims: Vec<Claim>, observed: Vec<Citation>) -> Envelope {
        let mut env = Envelope::new("r1", None, "query");
        let result =
            ToolResult::success("search_code", serde_json::Value::Null).with_citations(observed);
        env.record_tool_result(&result);
        env.set_output(StageOutput::Synthesizer(SynthesizerOutput { claims }));
        env
    }

    #[test]
    fn supported_claims_pass_validation() {
        let env = envelope_with_claims(
            vec![Claim {
                text: "login lives in auth".to_string(),
                supporting_citations: vec![Citation::new("src/auth.py", 3)],
            }],
            vec![Citation::new("src/auth.py", 3)],
        );

        let output = validate(
            &env,
            CriticOutput {
                verdict: CriticVerdict::Approve,
                unsupported_claims: Vec::new(),
                missing_evidence: Vec::new(),
                reason: String::new(),
                suggested_reintent_focus: None,
            },
        );
        assert_eq!(output.verdict, CriticVerdict::Approve);
    }

    #[test]
    fn uncited_claims_force_rejection() {
        let env = envelope_with_claims(
            vec![Claim {
                text: "the error_handler retries forever".to_string(),
                supporting_citations: Vec::new(),
            }],
            vec![Citation::new("src/auth.py", 3)],
        );

        let output = validate(
            &env,
            CriticOutput {
                verdict: CriticVerdict::Approve,
                unsupported_claims: Vec::new(),
                missing_evidence: Vec::new(),
                reason: String::new(),
                suggested_reintent_focus: None,
            },
        );
        assert_eq!(output.verdict, CriticVerdict::Reject);
        assert_eq!(output.unsupported_claims.len(), 1);
        assert_eq!(output.suggested_reintent_focus.as_deref(), Some("error_handler"));
    }

    #[test]
    fn citations_outside_the_envelope_are_unsupported() {
        let env = envelope_with_claims(
            vec![Claim {
                text: "made up".to_string(),
                supporting_citations: vec![Citation::new("ghost.rs", 1)],
            }],
            vec![Citation::new("src/auth.py", 3)],
        );
        assert_eq!(unsupported_claims(&env).len(), 1);
    }

    #[test]
    fn parse_accepts_the_three_verdicts() {
        assert!(parse(r#"{"verdict": "approve"}"#).is_ok());
        assert!(parse(r#"{"verdict": "reject", "reason": "x"}"#).is_ok());
        assert!(parse(r#"{"verdict": "clarify"}"#).is_ok());
        assert!(parse(r#"{"verdict": "maybe"}"#).is_err());
    }
}
