use crate::accountant::ResourceAccountant;
use crate::context;
use crate::digest::SessionDigest;
use crate::error::{PipelineError, Result};
use crate::llm::{CompletionOptions, LlmClient, LlmError};
use crate::stages::{self, StageDef};
use analyst_protocol::{
    now_ms, AnalysisEvent, CriticVerdict, Envelope, QueryResponse, StageEvent, StageName,
    StageOutput, StageStatus, TerminalEvent, TerminationReason,
};
use analyst_store::{EventLog, SessionStore};
use analyst_tools::{ToolRegistry, Toolbox};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Everything a runtime task needs, shared across requests. The registry and
/// bounds are frozen before the first request is accepted.
pub struct RuntimeHandles {
    pub registry: Arc<ToolRegistry>,
    pub toolbox: Arc<Toolbox>,
    pub llm: Arc<dyn LlmClient>,
    pub accountant: Arc<dyn ResourceAccountant>,
    pub sessions: Arc<dyn SessionStore>,
    pub events: Arc<dyn EventLog>,
}

/// Where control goes after a stage completes.
enum Next {
    Stage(StageName),
    Clarify(String),
    Reintent,
    RejectedFinal,
    Terminal,
}

/// What a stage run reported besides its output.
enum StageSignal {
    Done(String),
    QuotaTripped(String),
    CancelledMidStage,
}

/// Advances one envelope through the seven stages, emitting an event at every
/// boundary and exactly one terminal event. The runtime task is the single
/// writer of its envelope.
pub struct PipelineRuntime {
    handles: RuntimeHandles,
    pipeline: Vec<StageDef>,
}

impl PipelineRuntime {
    pub fn new(handles: RuntimeHandles) -> Self {
        Self {
            handles,
            pipeline: stages::standard_pipeline(),
        }
    }

    pub fn stage_count(&self) -> usize {
        self.pipeline.len()
    }

    /// Run a request to termination. A replayed envelope that is already
    /// terminated re-emits its terminal event and touches nothing else.
    pub async fn run(
        &self,
        mut envelope: Envelope,
        cancel: CancellationToken,
        tx: UnboundedSender<AnalysisEvent>,
    ) -> Envelope {
        if envelope.is_terminated() {
            self.emit_terminal(&envelope, &tx, false).await;
            return envelope;
        }

        let mut pending: Option<TerminationReason> = None;

        loop {
            if envelope.is_terminated() {
                break;
            }
            if cancel.is_cancelled() {
                envelope.terminate(TerminationReason::Cancelled);
                break;
            }

            let stage = envelope.current_stage();

            // Stage-boundary quota check. Once a pending reason routes the
            // request to Integration, the remaining hop is always allowed.
            if pending.is_none() && stage != StageName::Integration {
                let check = self.handles.accountant.check_quota(&envelope.request_id);
                if !check.ok {
                    let reason = check.reason.unwrap_or_else(|| "quota exceeded".to_string());
                    log::info!("request {} hit quota: {reason}", envelope.request_id);
                    pending = Some(TerminationReason::QuotaExceeded);
                    envelope.advance_to(StageName::Integration);
                    continue;
                }
            }

            envelope.resource_usage.agent_hops += 1;
            if envelope.resource_usage.agent_hops
                > self.handles.toolbox.bounds.max_agent_hops_per_query.saturating_mul(2)
            {
                envelope.terminate(TerminationReason::CycleLimit);
                break;
            }

            self.emit_stage(
                &envelope,
                stage,
                StageStatus::Started,
                format!("cycle {}", envelope.reintent_cycles()),
                &tx,
            )
            .await;

            match self.run_stage(&mut envelope, stage, pending, &cancel).await {
                Ok(StageSignal::Done(summary)) => {
                    self.emit_stage(&envelope, stage, StageStatus::Completed, summary, &tx)
                        .await;
                }
                Ok(StageSignal::QuotaTripped(reason)) => {
                    self.emit_stage(&envelope, stage, StageStatus::Completed, reason, &tx)
                        .await;
                    pending = Some(TerminationReason::QuotaExceeded);
                    envelope.advance_to(StageName::Integration);
                    continue;
                }
                Ok(StageSignal::CancelledMidStage) => {
                    self.emit_stage(
                        &envelope,
                        stage,
                        StageStatus::Completed,
                        "partial output; cancellation observed".to_string(),
                        &tx,
                    )
                    .await;
                    envelope.terminate(TerminationReason::Cancelled);
                    break;
                }
                Err(err) => {
                    log::warn!("stage {stage} failed for {}: {err}", envelope.request_id);
                    self.emit_stage(&envelope, stage, StageStatus::Failed, err.to_string(), &tx)
                        .await;
                    envelope.terminate(TerminationReason::InternalError);
                    break;
                }
            }

            match self.transition(stage, &envelope) {
                Next::Stage(next) => envelope.advance_to(next),
                Next::Clarify(question) => {
                    let output = stages::integration::build(&envelope, None, Some(&question));
                    envelope.set_output(StageOutput::Integration(output));
                    envelope.terminate(TerminationReason::Completed);
                }
                Next::Reintent => {
                    let focus = envelope
                        .critic()
                        .and_then(|c| c.suggested_reintent_focus.clone());
                    envelope.begin_reintent(focus);
                }
                Next::RejectedFinal => {
                    pending = Some(TerminationReason::CriticRejected);
                    envelope.advance_to(StageName::Integration);
                }
                Next::Terminal => {
                    envelope.terminate(pending.take().unwrap_or(TerminationReason::Completed));
                }
            }
        }

        self.emit_terminal(&envelope, &tx, true).await;
        envelope
    }

    /// Next stage in pipeline order, for the non-branching transitions.
    fn next_in_line(&self, stage: StageName) -> StageName {
        self.pipeline
            .iter()
            .skip_while(|def| def.name != stage)
            .nth(1)
            .map(|def| def.name)
            .unwrap_or(StageName::Integration)
    }

    /// The only legal mutations of `current_stage` flow from here.
    fn transition(&self, stage: StageName, envelope: &Envelope) -> Next {
        match stage {
            StageName::Perception => Next::Stage(self.next_in_line(stage)),
            StageName::Intent => match envelope.intent() {
                Some(intent) if intent.clarification_required => Next::Clarify(
                    intent
                        .clarification_question
                        .clone()
                        .unwrap_or_else(default_clarification),
                ),
                _ => Next::Stage(self.next_in_line(stage)),
            },
            StageName::Planner | StageName::Executor | StageName::Synthesizer => {
                Next::Stage(self.next_in_line(stage))
            }
            StageName::Critic => match envelope.critic().map(|c| c.verdict) {
                Some(CriticVerdict::Clarify) => {
                    let question = envelope
                        .critic()
                        .map(|c| c.reason.clone())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(default_clarification);
                    Next::Clarify(question)
                }
                Some(CriticVerdict::Reject) => {
                    if envelope.can_reintent() {
                        Next::Reintent
                    } else {
                        Next::RejectedFinal
                    }
                }
                Some(CriticVerdict::Approve) | None => Next::Stage(StageName::Integration),
            },
            StageName::Integration => Next::Terminal,
        }
    }

    async fn run_stage(
        &self,
        envelope: &mut Envelope,
        stage: StageName,
        pending: Option<TerminationReason>,
        cancel: &CancellationToken,
    ) -> Result<StageSignal> {
        match stage {
            StageName::Perception => {
                stages::perception::run(envelope, &self.handles.sessions).await?;
                let hints = envelope
                    .perception()
                    .map(|p| p.intent_hints.len())
                    .unwrap_or(0);
                Ok(StageSignal::Done(format!("{hints} target hints")))
            }
            StageName::Intent => {
                let prompt = context::intent_prompt(envelope);
                let query_is_empty = envelope
                    .perception()
                    .map(|p| p.normalized_query.is_empty())
                    .unwrap_or_else(|| envelope.query.trim().is_empty());
                let output = self
                    .llm_stage(envelope, "intent", &prompt, false, |text| {
                        stages::intent::parse(text, query_is_empty)
                    })
                    .await?;
                let summary = format!(
                    "{} ({} goals)",
                    output.classified_intent.as_str(),
                    output.goals.len()
                );
                envelope.set_output(StageOutput::Intent(output));
                Ok(StageSignal::Done(summary))
            }
            StageName::Planner => {
                let prompt = context::planner_prompt(envelope);
                let mut plan = self
                    .llm_stage(envelope, "planner", &prompt, false, stages::planner::parse)
                    .await?;
                stages::planner::enforce_plan_discipline(envelope, &mut plan);
                plan.context_budget_remaining = self
                    .handles
                    .toolbox
                    .bounds
                    .max_total_code_tokens
                    .saturating_sub(envelope.resource_usage.code_tokens);
                let summary = format!("{} steps", plan.steps.len());
                envelope.set_output(StageOutput::Planner(plan));
                Ok(StageSignal::Done(summary))
            }
            StageName::Executor => {
                let run = stages::executor::run(
                    envelope,
                    &self.handles.registry,
                    &self.handles.toolbox,
                    &self.handles.accountant,
                    cancel,
                )
                .await?;
                if run.cancelled {
                    return Ok(StageSignal::CancelledMidStage);
                }
                if let Some(reason) = run.quota_reason {
                    return Ok(StageSignal::QuotaTripped(reason));
                }
                let results = envelope.executor().map(|e| e.results.len()).unwrap_or(0);
                Ok(StageSignal::Done(format!(
                    "{} tool calls, {} citations",
                    results,
                    envelope.citations().len()
                )))
            }
            StageName::Synthesizer => {
                let prompt = context::synthesizer_prompt(envelope);
                let output = self
                    .llm_stage(
                        envelope,
                        "synthesizer",
                        &prompt,
                        false,
                        stages::synthesizer::parse,
                    )
                    .await?;
                let summary = format!("{} claims", output.claims.len());
                envelope.set_output(StageOutput::Synthesizer(output));
                Ok(StageSignal::Done(summary))
            }
            StageName::Critic => {
                let prompt = context::critic_prompt(envelope);
                // The critic alone gets one in-cycle retry after a timeout.
                let raw = self
                    .llm_stage(envelope, "critic", &prompt, true, stages::critic::parse)
                    .await?;
                let validated = stages::critic::validate(envelope, raw);
                let summary = format!(
                    "{:?} ({} unsupported)",
                    validated.verdict,
                    validated.unsupported_claims.len()
                );
                envelope.set_output(StageOutput::Critic(validated));
                Ok(StageSignal::Done(summary))
            }
            StageName::Integration => {
                let output = stages::integration::build(envelope, pending, None);
                let summary = format!("{} cited sources", output.cited_sources.len());
                envelope.set_output(StageOutput::Integration(output));
                Ok(StageSignal::Done(summary))
            }
        }
    }

    /// One LLM call with usage recording, a single same-stage retry for
    /// malformed output, and an optional single retry after a timeout.
    async fn llm_stage<T>(
        &self,
        envelope: &mut Envelope,
        stage: &'static str,
        prompt: &str,
        retry_on_timeout: bool,
        parse: impl Fn(&str) -> std::result::Result<T, String>,
    ) -> Result<T> {
        let options = CompletionOptions::default();
        let mut timeout_retried = false;
        let mut parse_retried = false;

        loop {
            let completion = match self.handles.llm.complete(prompt, &options).await {
                Ok(completion) => completion,
                Err(LlmError::Timeout) if retry_on_timeout && !timeout_retried => {
                    log::warn!("{stage} timed out; retrying once");
                    timeout_retried = true;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            self.handles.accountant.record_llm_call(
                &envelope.request_id,
                completion.tokens_in,
                completion.tokens_out,
            );
            envelope.resource_usage.llm_calls += 1;
            envelope.resource_usage.tokens_in += completion.tokens_in;
            envelope.resource_usage.tokens_out += completion.tokens_out;

            match parse(&completion.text) {
                Ok(value) => return Ok(value),
                Err(message) if !parse_retried => {
                    log::warn!("{stage} produced malformed output ({message}); retrying once");
                    parse_retried = true;
                }
                Err(message) => {
                    return Err(PipelineError::MalformedOutput { stage, message });
                }
            }
        }
    }

    async fn emit_stage(
        &self,
        envelope: &Envelope,
        stage: StageName,
        status: StageStatus,
        summary: String,
        tx: &UnboundedSender<AnalysisEvent>,
    ) {
        let event = StageEvent {
            request_id: envelope.request_id.clone(),
            stage: stage.as_str().to_string(),
            status,
            summary,
            timestamp_ms: now_ms(),
        };
        if let Err(err) = self
            .handles
            .events
            .append(
                &envelope.request_id,
                "stage",
                serde_json::to_value(&event).unwrap_or_default(),
            )
            .await
        {
            log::debug!("event log append failed: {err}");
        }
        let _ = tx.send(AnalysisEvent::Stage(event));
    }

    /// Build and emit the terminal event; `persist` is false on replay so a
    /// saved envelope produces no new writes.
    async fn emit_terminal(
        &self,
        envelope: &Envelope,
        tx: &UnboundedSender<AnalysisEvent>,
        persist: bool,
    ) {
        let response = terminal_response(envelope);
        let event = TerminalEvent {
            request_id: envelope.request_id.clone(),
            explanation: response
                .termination_reason
                .explanation()
                .map(str::to_string),
            response,
            timestamp_ms: now_ms(),
        };

        if persist {
            if let Err(err) = self
                .handles
                .events
                .append(
                    &envelope.request_id,
                    "terminal",
                    serde_json::to_value(&event).unwrap_or_default(),
                )
                .await
            {
                log::debug!("event log append failed: {err}");
            }

            if let Some(session_id) = &envelope.session_id {
                let digest = SessionDigest {
                    last_query: envelope.query.clone(),
                    explored_files: envelope.explored_files.clone(),
                    citations: envelope
                        .citations()
                        .iter()
                        .take(20)
                        .map(|c| c.to_string())
                        .collect(),
                };
                if let Err(err) = self.handles.sessions.save(session_id, &digest.to_bytes()).await
                {
                    log::warn!("session digest save failed: {err}");
                }
            }
        }

        let _ = tx.send(AnalysisEvent::Terminal(event));
    }
}

fn default_clarification() -> String {
    "Could you say more about what you want to know about this repository?".to_string()
}

/// The terminal payload both service operations return.
pub fn terminal_response(envelope: &Envelope) -> QueryResponse {
    let reason = envelope
        .termination_reason()
        .unwrap_or(TerminationReason::InternalError);
    let final_response = envelope
        .integration()
        .map(|i| i.final_response.clone())
        .unwrap_or_else(|| {
            reason
                .explanation()
                .unwrap_or("The request ended before a response could be produced.")
                .to_string()
        });
    QueryResponse {
        final_response,
        citations: envelope.citations().to_vec(),
        termination_reason: reason,
        usage: envelope.resource_usage,
    }
}
