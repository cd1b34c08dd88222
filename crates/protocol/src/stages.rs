use crate::citation::Citation;
use crate::tool::ToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The seven pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Perception,
    Intent,
    Planner,
    Executor,
    Synthesizer,
    Critic,
    Integration,
}

impl StageName {
    pub const ALL: [StageName; 7] = [
        StageName::Perception,
        StageName::Intent,
        StageName::Planner,
        StageName::Executor,
        StageName::Synthesizer,
        StageName::Critic,
        StageName::Integration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Perception => "perception",
            StageName::Intent => "intent",
            StageName::Planner => "planner",
            StageName::Executor => "executor",
            StageName::Synthesizer => "synthesizer",
            StageName::Critic => "critic",
            StageName::Integration => "integration",
        }
    }

    /// Position in the fixed stage order, 0-indexed.
    pub fn order(self) -> usize {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .unwrap_or_default()
    }

    /// Stages cleared when the critic sends the request back to Intent.
    /// Perception output and accumulated evidence survive re-entry.
    pub fn cleared_on_reintent(self) -> bool {
        matches!(
            self,
            StageName::Intent
                | StageName::Planner
                | StageName::Executor
                | StageName::Synthesizer
                | StageName::Critic
        )
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the query appears to be about, detected before any LLM call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    File,
    Directory,
    Symbol,
    Module,
    Repository,
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct Observation {
    pub target_kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct PerceptionOutput {
    pub normalized_query: String,
    #[serde(default)]
    pub intent_hints: Vec<Observation>,
    #[serde(default)]
    pub session_context_digest: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClassifiedIntent {
    FindSymbol,
    TraceFlow,
    Explain,
    Search,
    History,
}

impl ClassifiedIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassifiedIntent::FindSymbol => "find_symbol",
            ClassifiedIntent::TraceFlow => "trace_flow",
            ClassifiedIntent::Explain => "explain",
            ClassifiedIntent::Search => "search",
            ClassifiedIntent::History => "history",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct IntentOutput {
    pub classified_intent: ClassifiedIntent,
    pub goals: Vec<String>,
    #[serde(default)]
    pub ambiguities: Vec<String>,
    #[serde(default)]
    pub clarification_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
}

/// Tools the planner is allowed to emit. Everything else is internal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlannedTool {
    SearchCode,
    ReadCode,
}

impl PlannedTool {
    pub fn as_str(self) -> &'static str {
        match self {
            PlannedTool::SearchCode => "search_code",
            PlannedTool::ReadCode => "read_code",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    pub tool: PlannedTool,
    pub arguments: serde_json::Value,
    pub rationale: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct PlannerOutput {
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub context_budget_remaining: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExecutorOutput {
    pub results: Vec<ToolResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct Claim {
    pub text: String,
    #[serde(default)]
    pub supporting_citations: Vec<Citation>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SynthesizerOutput {
    pub claims: Vec<Claim>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CriticVerdict {
    Approve,
    Reject,
    Clarify,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct CriticOutput {
    pub verdict: CriticVerdict,
    #[serde(default)]
    pub unsupported_claims: Vec<String>,
    #[serde(default)]
    pub missing_evidence: Vec<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_reintent_focus: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct IntegrationOutput {
    pub final_response: String,
    #[serde(default)]
    pub cited_sources: Vec<Citation>,
}

/// A stage's parsed result, tagged so an envelope can be replayed from JSON.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutput {
    Perception(PerceptionOutput),
    Intent(IntentOutput),
    Planner(PlannerOutput),
    Executor(ExecutorOutput),
    Synthesizer(SynthesizerOutput),
    Critic(CriticOutput),
    Integration(IntegrationOutput),
}

impl StageOutput {
    pub fn stage(&self) -> StageName {
        match self {
            StageOutput::Perception(_) => StageName::Perception,
            StageOutput::Intent(_) => StageName::Intent,
            StageOutput::Planner(_) => StageName::Planner,
            StageOutput::Executor(_) => StageName::Executor,
            StageOutput::Synthesizer(_) => StageName::Synthesizer,
            StageOutput::Critic(_) => StageName::Critic,
            StageOutput::Integration(_) => StageName::Integration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(StageName::Perception.order(), 0);
        assert_eq!(StageName::Integration.order(), 6);
        assert!(StageName::Intent.cleared_on_reintent());
        assert!(!StageName::Perception.cleared_on_reintent());
        assert!(!StageName::Integration.cleared_on_reintent());
    }

    #[test]
    fn stage_output_round_trips_with_tag() {
        let output = StageOutput::Intent(IntentOutput {
            classified_intent: ClassifiedIntent::FindSymbol,
            goals: vec!["Locate login".to_string()],
            ambiguities: Vec::new(),
            clarification_required: false,
            clarification_question: None,
        });
        let json = serde_json::to_value(&output).expect("serialize");
        assert_eq!(json["stage"], "intent");
        assert_eq!(json["classified_intent"], "find_symbol");
        let back: StageOutput = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.stage(), StageName::Intent);
    }
}
