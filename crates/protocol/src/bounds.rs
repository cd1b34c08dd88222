use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hard context bounds enforced by the executor and the accountant.
///
/// Exceeding any bound terminates the request with `quota_exceeded`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ContextBounds {
    pub max_tree_depth: usize,
    pub max_file_slice_tokens: usize,
    pub max_grep_results: usize,
    pub max_symbol_results: usize,
    pub max_files_per_query: usize,
    pub max_total_code_tokens: u64,
    pub max_llm_calls_per_query: u64,
    pub max_agent_hops_per_query: u64,
}

impl Default for ContextBounds {
    fn default() -> Self {
        Self {
            max_tree_depth: 10,
            max_file_slice_tokens: 4_000,
            max_grep_results: 50,
            max_symbol_results: 100,
            max_files_per_query: 10,
            max_total_code_tokens: 25_000,
            max_llm_calls_per_query: 10,
            max_agent_hops_per_query: 21,
        }
    }
}

/// Rough token estimate used for all budget accounting: one token per four
/// characters, rounded up. Uniform across tools so bounds compose.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Cumulative per-request usage counters.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResourceUsage {
    pub llm_calls: u64,
    pub tool_calls: u64,
    pub agent_hops: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// Tokens of tool-derived code evidence, counted against
    /// `max_total_code_tokens`.
    pub code_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let bounds = ContextBounds::default();
        assert_eq!(bounds.max_tree_depth, 10);
        assert_eq!(bounds.max_file_slice_tokens, 4_000);
        assert_eq!(bounds.max_grep_results, 50);
        assert_eq!(bounds.max_symbol_results, 100);
        assert_eq!(bounds.max_files_per_query, 10);
        assert_eq!(bounds.max_total_code_tokens, 25_000);
        assert_eq!(bounds.max_llm_calls_per_query, 10);
        assert_eq!(bounds.max_agent_hops_per_query, 21);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
