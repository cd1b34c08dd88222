mod bounds;
mod citation;
mod envelope;
mod event;
mod stages;
mod tool;

pub use bounds::{estimate_tokens, ContextBounds, ResourceUsage};
pub use citation::{Citation, CitationParseError, CitationSet};
pub use envelope::{Envelope, TerminationReason, MAX_REINTENT_CYCLES};
pub use event::{
    now_ms, unix_ms, AnalysisEvent, QueryOptions, QueryRequest, QueryResponse, StageEvent,
    StageStatus, TerminalEvent,
};
pub use stages::{
    Claim, ClassifiedIntent, CriticOutput, CriticVerdict, ExecutorOutput, IntegrationOutput,
    IntentOutput, Observation, PerceptionOutput, PlanStep, PlannedTool, PlannerOutput, StageName,
    StageOutput, SynthesizerOutput, TargetKind,
};
pub use tool::{AttemptRecord, ToolResult, ToolStatus};
