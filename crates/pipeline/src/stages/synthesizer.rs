use crate::llm::extract_json;
use analyst_protocol::{Citation, Claim, SynthesizerOutput};
use serde::Deserialize;

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    claims: Vec<RawClaim>,
}

#[derive(Deserialize)]
struct RawClaim {
    text: String,
    #[serde(default)]
    citations: Vec<String>,
}

/// Parse synthesizer output. Citation strings that do not parse are dropped;
/// a claim left with none will fail critic validation, which is the correct
/// signal for fabricated references.
pub(crate) fn parse(text: &str) -> Result<SynthesizerOutput, String> {
    let json = extract_json(text).ok_or_else(|| "no JSON object in output".to_string())?;
    let raw: RawClaims = serde_json::from_str(json).map_err(|e| e.to_string())?;

    let claims = raw
        .claims
        .into_iter()
        .map(|claim| {
            let supporting_citations: Vec<Citation> = claim
                .citations
                .iter()
                .filter_map(|c| c.trim_matches(['[', ']']).parse().ok())
                .collect();
            Claim {
                text: claim.text,
                supporting_citations,
            }
        })
        .collect();

    Ok(SynthesizerOutput { claims })
}
