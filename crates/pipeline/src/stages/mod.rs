pub(crate) mod critic;
pub(crate) mod executor;
pub(crate) mod integration;
pub(crate) mod intent;
pub(crate) mod perception;
pub(crate) mod planner;
pub(crate) mod synthesizer;

use analyst_protocol::StageName;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Deterministic,
    Llm,
}

/// One stage as a value: the runtime is generic over an ordered list of
/// these rather than over concrete stage types.
#[derive(Clone, Copy, Debug)]
pub struct StageDef {
    pub name: StageName,
    pub kind: StageKind,
}

/// The fixed seven-stage pipeline.
pub fn standard_pipeline() -> Vec<StageDef> {
    vec![
        StageDef {
            name: StageName::Perception,
            kind: StageKind::Deterministic,
        },
        StageDef {
            name: StageName::Intent,
            kind: StageKind::Llm,
        },
        StageDef {
            name: StageName::Planner,
            kind: StageKind::Llm,
        },
        StageDef {
            name: StageName::Executor,
            kind: StageKind::Deterministic,
        },
        StageDef {
            name: StageName::Synthesizer,
            kind: StageKind::Llm,
        },
        StageDef {
            name: StageName::Critic,
            kind: StageKind::Llm,
        },
        StageDef {
            name: StageName::Integration,
            kind: StageKind::Deterministic,
        },
    ]
}
