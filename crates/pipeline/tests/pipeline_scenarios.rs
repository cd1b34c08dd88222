use analyst_pipeline::test_support::{write_fixture_repo, ScriptedLlm};
use analyst_pipeline::AnalystService;
use analyst_protocol::{
    AnalysisEvent, ContextBounds, PlannedTool, QueryRequest, StageStatus, TerminationReason,
    ToolStatus,
};
use analyst_store::{EventLog, MemoryEventLog};
use std::sync::Arc;
use tempfile::TempDir;

fn reject_script(llm: &ScriptedLlm, focus: &str) {
    llm.push(r#"{"intent": "explain", "goals": ["Understand error handling"]}"#);
    llm.push(
        r#"{"steps": [{"tool": "search_code", "arguments": {"query": "error"},
            "rationale": "survey error-related code"}]}"#,
    );
    llm.push(r#"{"claims": [{"text": "Errors are logged to a file", "citations": []}]}"#);
    llm.push(format!(
        r#"{{"verdict": "reject", "unsupported_claims": ["Errors are logged to a file"],
            "reason": "uncited claim", "suggested_reintent_focus": "{focus}"}}"#
    ));
}

#[tokio::test]
async fn s1_find_symbol_single_cycle() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push(r#"{"intent": "find_symbol", "goals": ["Locate login"]}"#);
    llm.push(
        r#"{"steps": [{"tool": "search_code", "arguments": {"query": "login"},
            "rationale": "find the definition"}]}"#,
    );
    llm.push(
        r#"{"claims": [{"text": "`login` is defined in `src/auth/login.py`",
            "citations": ["src/auth/login.py:42"]}]}"#,
    );
    llm.push(r#"{"verdict": "approve", "reason": "claim cites observed evidence"}"#);

    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");

    let (handle, mut rx) = service.query_stream(QueryRequest::new("Where is login defined?"));
    let envelope = handle.task.await.expect("task");

    let mut stage_events = Vec::new();
    let mut terminal = None;
    while let Some(event) = rx.recv().await {
        match event {
            AnalysisEvent::Stage(event) => stage_events.push((event.stage, event.status)),
            AnalysisEvent::Terminal(event) => terminal = Some(event),
        }
    }
    let terminal = terminal.expect("terminal event");

    assert_eq!(envelope.reintent_cycles(), 0);
    assert_eq!(
        terminal.response.termination_reason,
        TerminationReason::Completed
    );
    assert!(terminal
        .response
        .final_response
        .contains("[src/auth/login.py:42]"));

    // Citation closure: everything the answer cites was observed by a tool.
    let integration = envelope.integration().expect("integration output");
    for citation in &integration.cited_sources {
        assert!(envelope.citations().contains(citation));
    }

    // Events arrive in stage order, started before completed, no failures.
    let expected_stages = [
        "perception",
        "intent",
        "planner",
        "executor",
        "synthesizer",
        "critic",
        "integration",
    ];
    let starts: Vec<&str> = stage_events
        .iter()
        .filter(|(_, status)| *status == StageStatus::Started)
        .map(|(stage, _)| stage.as_str())
        .collect();
    assert_eq!(starts, expected_stages);
    assert!(stage_events
        .iter()
        .all(|(_, status)| *status != StageStatus::Failed));
    assert_eq!(llm.calls(), 4);
}

#[tokio::test]
async fn s2_reentry_then_approval() {
    let llm = Arc::new(ScriptedLlm::new());
    // Cycle 0: diffuse search, an uncited claim, a rejection with a focus hint.
    reject_script(&llm, "error_handler");
    // Cycle 1: focused search, a properly cited claim, approval.
    llm.push(r#"{"intent": "explain", "goals": ["Locate error_handler"]}"#);
    llm.push(
        r#"{"steps": [{"tool": "search_code", "arguments": {"query": "error_handler"},
            "rationale": "follow the critic's focus hint"}]}"#,
    );
    llm.push(
        r#"{"claims": [{"text": "Errors are routed through `error_handler` in `src/errors.py`",
            "citations": ["src/errors.py:3"]}]}"#,
    );
    llm.push(r#"{"verdict": "approve", "reason": "claim cites observed evidence"}"#);

    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");

    let (handle, _rx) = service.query_stream(QueryRequest::new("Explain how errors are handled"));
    let envelope = handle.task.await.expect("task");

    assert_eq!(envelope.reintent_cycles(), 1);
    assert_eq!(
        envelope.termination_reason(),
        Some(TerminationReason::Completed)
    );
    let response = envelope.integration().expect("integration");
    assert!(response.final_response.contains("[src/errors.py:3]"));

    // Attempt history is monotone across the re-entry: cycle 0 tried two
    // strategies, cycle 1 found the symbol on the first.
    assert_eq!(envelope.attempt_history().len(), 3);
    assert_eq!(envelope.attempt_history()[0].strategy, "find_symbol (exact)");
    assert_eq!(envelope.attempt_history()[2].strategy, "find_symbol (exact)");
}

#[tokio::test]
async fn s3_cycle_limit_terminates_with_critic_rejected() {
    let llm = Arc::new(ScriptedLlm::new());
    for _ in 0..3 {
        reject_script(&llm, "retry");
    }

    let bounds = ContextBounds {
        max_llm_calls_per_query: 20,
        max_agent_hops_per_query: 40,
        ..ContextBounds::default()
    };
    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::builder(llm.clone())
        .bounds(bounds)
        .build(temp.path())
        .await
        .expect("service");

    let (handle, _rx) = service.query_stream(QueryRequest::new("Explain how errors are handled"));
    let envelope = handle.task.await.expect("task");

    assert_eq!(envelope.reintent_cycles(), 2);
    assert_eq!(
        envelope.termination_reason(),
        Some(TerminationReason::CriticRejected)
    );
    let response = envelope.integration().expect("integration still runs");
    assert!(response.final_response.contains("Unverified"));
    assert_eq!(llm.calls(), 12);
}

#[tokio::test]
async fn s4_missing_file_yields_candidates_not_fabrications() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push(r#"{"intent": "find_symbol", "goals": ["Show nonexistent.py"]}"#);
    llm.push(
        r#"{"steps": [{"tool": "read_code", "arguments": {"path": "nonexistent.py"},
            "rationale": "read the requested file"}]}"#,
    );
    llm.push(r#"{"claims": []}"#);
    llm.push(r#"{"verdict": "approve", "reason": "nothing to verify"}"#);

    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");

    let (handle, _rx) =
        service.query_stream(QueryRequest::new("Show contents of nonexistent.py"));
    let envelope = handle.task.await.expect("task");

    // Cold path: the plan opens with a locating search even though the model
    // only planned a read.
    let plan = envelope.planner().expect("plan");
    assert_eq!(plan.steps[0].tool, PlannedTool::SearchCode);
    assert_eq!(plan.steps[1].tool, PlannedTool::ReadCode);

    let executor = envelope.executor().expect("executor output");
    let read = executor
        .results
        .iter()
        .find(|r| r.tool == "read_code")
        .expect("read_code result");
    assert_eq!(read.status, ToolStatus::NotFound);
    assert_eq!(read.attempt_history.len(), 4);

    let response = envelope.integration().expect("integration");
    assert!(response
        .final_response
        .contains("No file named nonexistent.py was found"));
    assert!(response.cited_sources.is_empty());
    assert!(envelope.citations().is_empty());
}

#[tokio::test]
async fn s5_cancellation_mid_executor_keeps_partial_output() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push(r#"{"intent": "explain", "goals": ["Read everything"]}"#);
    let reads: Vec<String> = std::iter::repeat_with(|| {
        [
            "src/auth/login.py",
            "src/errors.py",
            "src/db.py",
            "src/app.py",
        ]
    })
    .take(3)
    .flatten()
    .map(|path| {
        format!(
            r#"{{"tool": "read_code", "arguments": {{"path": "{path}"}}, "rationale": "read"}}"#
        )
    })
    .collect();
    llm.push(format!(
        r#"{{"steps": [{{"tool": "search_code", "arguments": {{"query": "login"}},
            "rationale": "establish paths"}}, {}]}}"#,
        reads.join(", ")
    ));

    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");

    let (handle, mut rx) = service.query_stream(QueryRequest::new("Explain the whole app"));
    let cancel = handle.cancel.clone();

    let mut saw_terminal = false;
    while let Some(event) = rx.recv().await {
        match event {
            AnalysisEvent::Stage(event) => {
                if event.stage == "executor" && event.status == StageStatus::Started {
                    cancel.cancel();
                }
            }
            AnalysisEvent::Terminal(_) => saw_terminal = true,
        }
    }
    let envelope = handle.task.await.expect("task");

    assert!(saw_terminal);
    assert_eq!(
        envelope.termination_reason(),
        Some(TerminationReason::Cancelled)
    );
    let executor = envelope.executor().expect("partial executor output kept");
    assert!(!executor.results.is_empty());
    assert!(executor.results.len() < 13);
    // The synthesizer was never reached.
    assert_eq!(llm.calls(), 2);
}

#[tokio::test]
async fn s6_quota_exhaustion_routes_through_integration() {
    let llm = Arc::new(ScriptedLlm::new());
    reject_script(&llm, "error_handler");
    reject_script(&llm, "error_handler");
    llm.push(r#"{"intent": "explain", "goals": ["Locate error_handler"]}"#);

    let bounds = ContextBounds {
        max_llm_calls_per_query: 9,
        max_agent_hops_per_query: 40,
        ..ContextBounds::default()
    };
    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::builder(llm.clone())
        .bounds(bounds)
        .build(temp.path())
        .await
        .expect("service");

    let (handle, _rx) = service.query_stream(QueryRequest::new("Explain how errors are handled"));
    let envelope = handle.task.await.expect("task");

    assert_eq!(envelope.reintent_cycles(), 2);
    assert_eq!(
        envelope.termination_reason(),
        Some(TerminationReason::QuotaExceeded)
    );
    let response = envelope.integration().expect("integration");
    assert!(response.final_response.contains("exploration budget"));
    // Citations gathered before the quota tripped are still returned.
    assert!(!envelope.citations().is_empty());
    assert_eq!(llm.calls(), 9);
}

#[tokio::test]
async fn code_token_bound_stops_before_the_next_llm_call() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push(r#"{"intent": "find_symbol", "goals": ["Read login"]}"#);
    llm.push(
        r#"{"steps": [
            {"tool": "search_code", "arguments": {"query": "login"}, "rationale": "locate"},
            {"tool": "read_code", "arguments": {"path": "src/auth/login.py"},
             "rationale": "read the definition"}]}"#,
    );

    let bounds = ContextBounds {
        max_total_code_tokens: 5,
        ..ContextBounds::default()
    };
    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::builder(llm.clone())
        .bounds(bounds)
        .build(temp.path())
        .await
        .expect("service");

    let (handle, _rx) = service.query_stream(QueryRequest::new("Where is login defined?"));
    let envelope = handle.task.await.expect("task");

    assert_eq!(
        envelope.termination_reason(),
        Some(TerminationReason::QuotaExceeded)
    );
    // Intent and planner ran; the synthesizer call never happened.
    assert_eq!(llm.calls(), 2);
    assert!(envelope.resource_usage.code_tokens > 5);
}

#[tokio::test]
async fn terminated_envelopes_replay_without_external_calls() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push(r#"{"intent": "find_symbol", "goals": ["Locate login"]}"#);
    llm.push(
        r#"{"steps": [{"tool": "search_code", "arguments": {"query": "login"},
            "rationale": "find the definition"}]}"#,
    );
    llm.push(
        r#"{"claims": [{"text": "`login` is defined in `src/auth/login.py`",
            "citations": ["src/auth/login.py:42"]}]}"#,
    );
    llm.push(r#"{"verdict": "approve", "reason": "ok"}"#);

    let events = Arc::new(MemoryEventLog::new());
    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::builder(llm.clone())
        .events(events.clone())
        .build(temp.path())
        .await
        .expect("service");

    let (handle, mut rx) = service.query_stream(QueryRequest::new("Where is login defined?"));
    let envelope = handle.task.await.expect("task");
    let mut first_terminal = None;
    while let Some(event) = rx.recv().await {
        if let AnalysisEvent::Terminal(event) = event {
            first_terminal = Some(event.response);
        }
    }
    let first_terminal = first_terminal.expect("terminal");
    let calls_before = llm.calls();
    let request_id = envelope.request_id.clone();
    let events_before = events.events_for(&request_id).await.expect("events").len();

    let (task, mut replay_rx) = service.replay(envelope.clone());
    task.await.expect("replay task");

    let mut replay_events = Vec::new();
    while let Some(event) = replay_rx.recv().await {
        replay_events.push(event);
    }

    assert_eq!(replay_events.len(), 1);
    match &replay_events[0] {
        AnalysisEvent::Terminal(event) => {
            assert_eq!(event.response.final_response, first_terminal.final_response);
            assert_eq!(
                event.response.termination_reason,
                first_terminal.termination_reason
            );
        }
        AnalysisEvent::Stage(_) => panic!("replay must not run stages"),
    }
    assert_eq!(llm.calls(), calls_before);
    assert_eq!(
        events.events_for(&request_id).await.expect("events").len(),
        events_before
    );
}

#[tokio::test]
async fn malformed_llm_output_is_retried_once_then_fatal() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push("this is not json");
    llm.push(r#"{"intent": "search", "goals": ["look around"]}"#);
    llm.push(r#"{"steps": []}"#);
    llm.push(r#"{"claims": []}"#);
    llm.push(r#"{"verdict": "approve", "reason": "nothing to check"}"#);

    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");

    let (handle, _rx) = service.query_stream(QueryRequest::new("poke around"));
    let envelope = handle.task.await.expect("task");
    assert_eq!(
        envelope.termination_reason(),
        Some(TerminationReason::Completed)
    );
    assert_eq!(llm.calls(), 5);

    // A second consecutive malformed response is fatal.
    let llm = Arc::new(ScriptedLlm::new());
    llm.push("garbage");
    llm.push("more garbage");
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");
    let (handle, _rx) = service.query_stream(QueryRequest::new("poke around"));
    let envelope = handle.task.await.expect("task");
    assert_eq!(
        envelope.termination_reason(),
        Some(TerminationReason::InternalError)
    );
    assert_eq!(llm.calls(), 2);
}

#[tokio::test]
async fn critic_timeout_gets_one_in_cycle_retry() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push(r#"{"intent": "search", "goals": ["look"]}"#);
    llm.push(r#"{"steps": []}"#);
    llm.push(r#"{"claims": []}"#);
    llm.push_timeout();
    llm.push(r#"{"verdict": "approve", "reason": "nothing to check"}"#);

    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");

    let (handle, _rx) = service.query_stream(QueryRequest::new("anything"));
    let envelope = handle.task.await.expect("task");
    assert_eq!(
        envelope.termination_reason(),
        Some(TerminationReason::Completed)
    );

    // The same timeout at a non-critic stage is fatal.
    let llm = Arc::new(ScriptedLlm::new());
    llm.push_timeout();
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");
    let (handle, _rx) = service.query_stream(QueryRequest::new("anything"));
    let envelope = handle.task.await.expect("task");
    assert_eq!(
        envelope.termination_reason(),
        Some(TerminationReason::InternalError)
    );
}

#[tokio::test]
async fn empty_queries_resolve_to_a_clarification() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push(
        r#"{"intent": "search", "goals": [], "clarification_needed": true,
            "clarification_question": "What would you like to know about this repository?"}"#,
    );

    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");

    let response = service.query(QueryRequest::new("   ")).await.expect("query");
    assert_eq!(response.termination_reason, TerminationReason::Completed);
    assert_eq!(
        response.final_response,
        "What would you like to know about this repository?"
    );
    assert!(response.citations.is_empty());
}

#[tokio::test]
async fn completed_answers_are_served_from_the_explanation_cache() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push(r#"{"intent": "find_symbol", "goals": ["Locate login"]}"#);
    llm.push(
        r#"{"steps": [{"tool": "search_code", "arguments": {"query": "login"},
            "rationale": "find"}]}"#,
    );
    llm.push(
        r#"{"claims": [{"text": "`login` is defined in `src/auth/login.py`",
            "citations": ["src/auth/login.py:42"]}]}"#,
    );
    llm.push(r#"{"verdict": "approve", "reason": "ok"}"#);

    let temp = TempDir::new().expect("tempdir");
    write_fixture_repo(temp.path()).await;
    let service = AnalystService::open(temp.path(), llm.clone())
        .await
        .expect("service");

    let first = service
        .query(QueryRequest::new("Where is login defined?"))
        .await
        .expect("first query");
    let second = service
        .query(QueryRequest::new("Where is login defined?"))
        .await
        .expect("second query");

    assert_eq!(first.final_response, second.final_response);
    // The script held exactly one run's worth of responses.
    assert_eq!(llm.calls(), 4);
}
