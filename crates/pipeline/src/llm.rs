use async_trait::async_trait;
use thiserror::Error;

/// Options forwarded to the completion backend.
#[derive(Clone, Debug)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    /// Ask the backend for a bare JSON object with no prose around it.
    pub json_only: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2_048,
            json_only: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Completion {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

#[derive(Clone, Debug)]
pub struct StreamDelta {
    pub delta: String,
    pub is_final: bool,
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("llm request timed out")]
    Timeout,
    #[error("llm transport error: {0}")]
    Transport(String),
}

/// The only seam between the pipeline and the inference backend. Adapters own
/// transport, retries at the wire level, and model selection; the pipeline
/// sees exactly these two operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError>;

    /// Streaming variant. The default adapter degrades to a single delta.
    async fn stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Vec<StreamDelta>, LlmError> {
        let completion = self.complete(prompt, options).await?;
        Ok(vec![StreamDelta {
            delta: completion.text,
            is_final: true,
        }])
    }
}

/// Extract the first JSON object from a completion. Tolerates prose or code
/// fences around the payload.
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_extracted_from_fenced_output() {
        let text = "```json\n{\"verdict\": \"approve\"}\n```";
        assert_eq!(extract_json(text), Some("{\"verdict\": \"approve\"}"));
        assert_eq!(extract_json("no json here"), None);
    }
}
