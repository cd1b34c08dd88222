use crate::digest::SessionDigest;
use crate::error::Result;
use analyst_protocol::{Envelope, Observation, PerceptionOutput, StageOutput, TargetKind};
use analyst_store::SessionStore;
use std::sync::Arc;

const SOURCE_EXTENSIONS: &[&str] = &[
    ".rs", ".py", ".pyi", ".js", ".jsx", ".ts", ".tsx", ".go", ".java",
];

/// Pure function of (query, session state): trims the query, classifies what
/// it appears to target, and loads the prior session digest. No LLM.
pub(crate) async fn run(
    envelope: &mut Envelope,
    sessions: &Arc<dyn SessionStore>,
) -> Result<()> {
    let digest = match &envelope.session_id {
        Some(session_id) => sessions
            .load(session_id)
            .await?
            .map(|bytes| SessionDigest::from_bytes(&bytes))
            .unwrap_or_default(),
        None => SessionDigest::default(),
    };

    let normalized = normalize(&envelope.query);
    let intent_hints = classify_targets(&normalized);

    envelope.set_output(StageOutput::Perception(PerceptionOutput {
        normalized_query: normalized,
        intent_hints,
        session_context_digest: digest.summary_line(),
    }));
    Ok(())
}

fn normalize(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pattern-based target detection: file paths by extension, directories by
/// trailing slash, symbols by identifier shape. Falls back to a repository-
/// wide observation for free text.
pub(crate) fn classify_targets(query: &str) -> Vec<Observation> {
    let mut hints = Vec::new();

    for raw in query.split_whitespace() {
        let token = raw.trim_matches(|c: char| {
            matches!(c, '"' | '\'' | '`' | '?' | ',' | ';' | '(' | ')')
        });
        if token.len() < 3 {
            continue;
        }

        if SOURCE_EXTENSIONS.iter().any(|ext| token.ends_with(ext)) {
            hints.push(Observation {
                target_kind: TargetKind::File,
                target: Some(token.to_string()),
            });
        } else if token.ends_with('/') {
            hints.push(Observation {
                target_kind: TargetKind::Directory,
                target: Some(token.trim_end_matches('/').to_string()),
            });
        } else if token.contains('/') {
            hints.push(Observation {
                target_kind: TargetKind::Module,
                target: Some(token.to_string()),
            });
        } else if is_identifier(token) && !is_common_word(token) {
            hints.push(Observation {
                target_kind: TargetKind::Symbol,
                target: Some(token.to_string()),
            });
        }
    }

    if hints.is_empty() {
        hints.push(Observation {
            target_kind: TargetKind::Repository,
            target: None,
        });
    }
    hints
}

fn is_identifier(token: &str) -> bool {
    let camel = token.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && token.chars().all(|c| c.is_ascii_alphanumeric());
    let snake = token.contains('_')
        && token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    camel || snake
}

fn is_common_word(token: &str) -> bool {
    matches!(
        token.to_ascii_lowercase().as_str(),
        "where" | "what" | "how" | "show" | "find" | "the" | "does" | "defined" | "definition"
            | "explain" | "contents" | "file" | "code"
    )
}
