use crate::bounds::ResourceUsage;
use crate::citation::CitationSet;
use crate::stages::{StageName, StageOutput};
use crate::tool::{AttemptRecord, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Critic-driven returns to Intent are bounded: the initial run is cycle 0,
/// the first re-entry is cycle 1.
pub const MAX_REINTENT_CYCLES: u32 = 2;

/// Why a request stopped advancing through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    CriticRejected,
    CycleLimit,
    QuotaExceeded,
    Cancelled,
    InternalError,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::Completed => "completed",
            TerminationReason::CriticRejected => "critic_rejected",
            TerminationReason::CycleLimit => "cycle_limit",
            TerminationReason::QuotaExceeded => "quota_exceeded",
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::InternalError => "internal_error",
        }
    }

    /// Plain-language explanation carried on non-`completed` terminal events.
    pub fn explanation(self) -> Option<&'static str> {
        match self {
            TerminationReason::Completed => None,
            TerminationReason::CriticRejected => Some(
                "The answer could not be fully verified against the repository; \
                 unverified statements are flagged in the response.",
            ),
            TerminationReason::CycleLimit => {
                Some("The analysis loop reached its iteration limit before converging.")
            }
            TerminationReason::QuotaExceeded => Some(
                "The exploration budget for this request was exhausted; \
                 the response covers only the evidence gathered so far.",
            ),
            TerminationReason::Cancelled => Some("The request was cancelled."),
            TerminationReason::InternalError => {
                Some("An internal error stopped the analysis early.")
            }
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_max_reintent() -> u32 {
    MAX_REINTENT_CYCLES
}

/// Per-request working memory, owned exclusively by the runtime task.
///
/// All invariant-sensitive fields are private; mutation goes through methods
/// that keep the re-entry and citation rules intact.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct Envelope {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub query: String,
    current_stage: StageName,
    stage_outputs: Vec<StageOutput>,
    attempt_history: Vec<AttemptRecord>,
    citations: CitationSet,
    reintent_cycles: u32,
    pub resource_usage: ResourceUsage,
    terminated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    termination_reason: Option<TerminationReason>,
    /// Per-request re-entry budget; never above `MAX_REINTENT_CYCLES`.
    #[serde(default = "default_max_reintent")]
    max_reintent: u32,
    /// Critic hint carried into the next Intent run after a re-entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reintent_focus: Option<String>,
    /// Files the executor has read, folded into the session digest.
    #[serde(default)]
    pub explored_files: Vec<String>,
}

impl Envelope {
    pub fn new(request_id: impl Into<String>, session_id: Option<String>, query: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            session_id,
            query: query.into(),
            current_stage: StageName::Perception,
            stage_outputs: Vec::new(),
            attempt_history: Vec::new(),
            citations: CitationSet::new(),
            reintent_cycles: 0,
            resource_usage: ResourceUsage::default(),
            terminated: false,
            termination_reason: None,
            max_reintent: MAX_REINTENT_CYCLES,
            reintent_focus: None,
            explored_files: Vec::new(),
        }
    }

    /// Lower the re-entry budget for this request. The global cap still
    /// applies.
    pub fn set_max_reintent(&mut self, max: u32) {
        self.max_reintent = max.min(MAX_REINTENT_CYCLES);
    }

    pub fn current_stage(&self) -> StageName {
        self.current_stage
    }

    /// Move to the next stage. Ignored once the envelope is terminated.
    pub fn advance_to(&mut self, stage: StageName) {
        if !self.terminated {
            self.current_stage = stage;
        }
    }

    pub fn reintent_cycles(&self) -> u32 {
        self.reintent_cycles
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination_reason
    }

    /// Terminate the request. The first reason wins; later calls are no-ops.
    pub fn terminate(&mut self, reason: TerminationReason) {
        if !self.terminated {
            self.terminated = true;
            self.termination_reason = Some(reason);
        }
    }

    pub fn stage_outputs(&self) -> &[StageOutput] {
        &self.stage_outputs
    }

    pub fn output(&self, stage: StageName) -> Option<&StageOutput> {
        self.stage_outputs.iter().find(|o| o.stage() == stage)
    }

    /// Record a stage result. Within a cycle each stage appears at most once;
    /// setting an output again replaces the previous one in place.
    pub fn set_output(&mut self, output: StageOutput) {
        if self.terminated {
            return;
        }
        let stage = output.stage();
        if let Some(slot) = self.stage_outputs.iter_mut().find(|o| o.stage() == stage) {
            *slot = output;
        } else {
            self.stage_outputs.push(output);
        }
    }

    pub fn perception(&self) -> Option<&crate::stages::PerceptionOutput> {
        match self.output(StageName::Perception) {
            Some(StageOutput::Perception(o)) => Some(o),
            _ => None,
        }
    }

    pub fn intent(&self) -> Option<&crate::stages::IntentOutput> {
        match self.output(StageName::Intent) {
            Some(StageOutput::Intent(o)) => Some(o),
            _ => None,
        }
    }

    pub fn planner(&self) -> Option<&crate::stages::PlannerOutput> {
        match self.output(StageName::Planner) {
            Some(StageOutput::Planner(o)) => Some(o),
            _ => None,
        }
    }

    pub fn executor(&self) -> Option<&crate::stages::ExecutorOutput> {
        match self.output(StageName::Executor) {
            Some(StageOutput::Executor(o)) => Some(o),
            _ => None,
        }
    }

    pub fn synthesizer(&self) -> Option<&crate::stages::SynthesizerOutput> {
        match self.output(StageName::Synthesizer) {
            Some(StageOutput::Synthesizer(o)) => Some(o),
            _ => None,
        }
    }

    pub fn critic(&self) -> Option<&crate::stages::CriticOutput> {
        match self.output(StageName::Critic) {
            Some(StageOutput::Critic(o)) => Some(o),
            _ => None,
        }
    }

    pub fn integration(&self) -> Option<&crate::stages::IntegrationOutput> {
        match self.output(StageName::Integration) {
            Some(StageOutput::Integration(o)) => Some(o),
            _ => None,
        }
    }

    pub fn citations(&self) -> &CitationSet {
        &self.citations
    }

    pub fn attempt_history(&self) -> &[AttemptRecord] {
        &self.attempt_history
    }

    /// Fold a tool result into the envelope: citations accumulate (stable,
    /// de-duplicated) and every tried strategy is appended to the request-wide
    /// attempt history.
    pub fn record_tool_result(&mut self, result: &ToolResult) {
        self.citations.extend(result.citations.iter().cloned());
        self.attempt_history
            .extend(result.attempt_history.iter().cloned());
    }

    /// Whether another critic-driven re-entry is allowed.
    pub fn can_reintent(&self) -> bool {
        self.reintent_cycles < self.max_reintent
    }

    /// Start a re-entry cycle: bump the counter, clear the outputs of stages
    /// Intent through Critic, and point the pipeline back at Intent. Evidence
    /// (citations, attempt history) is preserved.
    ///
    /// Returns false without mutating anything if the cycle budget is spent.
    pub fn begin_reintent(&mut self, focus: Option<String>) -> bool {
        if self.terminated || !self.can_reintent() {
            return false;
        }
        self.reintent_cycles += 1;
        self.stage_outputs.retain(|o| !o.stage().cleared_on_reintent());
        self.reintent_focus = focus;
        self.current_stage = StageName::Intent;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::Citation;
    use crate::stages::{ClassifiedIntent, IntentOutput, PerceptionOutput};

    fn intent_output() -> StageOutput {
        StageOutput::Intent(IntentOutput {
            classified_intent: ClassifiedIntent::Search,
            goals: vec!["goal".to_string()],
            ambiguities: Vec::new(),
            clarification_required: false,
            clarification_question: None,
        })
    }

    fn perception_output() -> StageOutput {
        StageOutput::Perception(PerceptionOutput {
            normalized_query: "q".to_string(),
            intent_hints: Vec::new(),
            session_context_digest: String::new(),
        })
    }

    #[test]
    fn reintent_clears_middle_stages_and_keeps_evidence() {
        let mut env = Envelope::new("r1", None, "query");
        env.set_output(perception_output());
        env.set_output(intent_output());

        let result = ToolResult::success("search_code", serde_json::Value::Null)
            .with_citations(vec![Citation::new("a.rs", 1)])
            .with_attempts(vec![AttemptRecord::new(1, "find_symbol (exact)", "success")]);
        env.record_tool_result(&result);

        assert!(env.begin_reintent(Some("error_handler".to_string())));
        assert_eq!(env.reintent_cycles(), 1);
        assert_eq!(env.current_stage(), StageName::Intent);
        assert!(env.perception().is_some());
        assert!(env.intent().is_none());
        assert_eq!(env.citations().len(), 1);
        assert_eq!(env.attempt_history().len(), 1);
        assert_eq!(env.reintent_focus.as_deref(), Some("error_handler"));
    }

    #[test]
    fn reintent_is_bounded() {
        let mut env = Envelope::new("r1", None, "query");
        assert!(env.begin_reintent(None));
        assert!(env.begin_reintent(None));
        assert!(!env.begin_reintent(None));
        assert_eq!(env.reintent_cycles(), MAX_REINTENT_CYCLES);
    }

    #[test]
    fn request_budget_can_only_shrink_reintent() {
        let mut env = Envelope::new("r1", None, "query");
        env.set_max_reintent(0);
        assert!(!env.begin_reintent(None));

        let mut env = Envelope::new("r2", None, "query");
        env.set_max_reintent(99);
        assert!(env.begin_reintent(None));
        assert!(env.begin_reintent(None));
        assert!(!env.begin_reintent(None));
    }

    #[test]
    fn termination_is_sticky() {
        let mut env = Envelope::new("r1", None, "query");
        env.terminate(TerminationReason::Cancelled);
        env.terminate(TerminationReason::Completed);
        assert_eq!(
            env.termination_reason(),
            Some(TerminationReason::Cancelled)
        );

        env.advance_to(StageName::Critic);
        assert_eq!(env.current_stage(), StageName::Perception);

        env.set_output(intent_output());
        assert!(env.intent().is_none());
    }

    #[test]
    fn envelope_serde_round_trip() {
        let mut env = Envelope::new("r1", Some("s1".to_string()), "query");
        env.set_output(perception_output());
        let result = ToolResult::success("search_code", serde_json::Value::Null)
            .with_citations(vec![Citation::new("a.rs", 1)]);
        env.record_tool_result(&result);
        env.terminate(TerminationReason::Completed);

        let json = serde_json::to_string(&env).expect("serialize");
        let back: Envelope = serde_json::from_str(&json).expect("deserialize");
        assert!(back.is_terminated());
        assert_eq!(back.citations().len(), 1);
        assert_eq!(back.termination_reason(), Some(TerminationReason::Completed));
    }
}
