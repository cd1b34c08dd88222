use crate::accountant::{BoundsAccountant, ResourceAccountant};
use crate::cache::ExplanationCache;
use crate::llm::LlmClient;
use crate::runtime::{PipelineRuntime, RuntimeHandles};
use analyst_protocol::{
    now_ms, AnalysisEvent, ContextBounds, Envelope, QueryRequest, QueryResponse,
};
use analyst_store::{
    CodeIndex, EventLog, FileStore, GitStore, MemoryEventLog, MemorySessionStore, SessionStore,
};
use analyst_tools::{ToolRegistry, Toolbox};
use anyhow::{Context as AnyhowContext, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running request: cancel it cooperatively, or await its final envelope.
pub struct QueryHandle {
    pub cancel: CancellationToken,
    pub task: JoinHandle<Envelope>,
}

/// Construction-time knobs; everything is frozen once `build` returns.
pub struct ServiceBuilder {
    bounds: ContextBounds,
    llm: Arc<dyn LlmClient>,
    sessions: Arc<dyn SessionStore>,
    events: Arc<dyn EventLog>,
    accountant: Option<Arc<dyn ResourceAccountant>>,
}

impl ServiceBuilder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            bounds: ContextBounds::default(),
            llm,
            sessions: Arc::new(MemorySessionStore::new()),
            events: Arc::new(MemoryEventLog::new()),
            accountant: None,
        }
    }

    pub fn bounds(mut self, bounds: ContextBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventLog>) -> Self {
        self.events = events;
        self
    }

    pub fn accountant(mut self, accountant: Arc<dyn ResourceAccountant>) -> Self {
        self.accountant = Some(accountant);
        self
    }

    /// Index the project and freeze the registry. Everything after this call
    /// is immutable shared state.
    pub async fn build(self, root: &Path) -> Result<AnalystService> {
        let index = Arc::new(
            CodeIndex::build(root)
                .await
                .with_context(|| format!("failed to index {}", root.display()))?,
        );
        let files = Arc::new(FileStore::new(root));
        let git = Arc::new(GitStore::new(root));
        let toolbox = Arc::new(Toolbox::new(index, files, git, self.bounds));
        let registry = Arc::new(ToolRegistry::builtin()?);

        let (accountant, bounds_accountant): (Arc<dyn ResourceAccountant>, _) =
            match self.accountant {
                Some(custom) => (custom, None),
                None => {
                    let inner = Arc::new(BoundsAccountant::new(self.bounds));
                    (inner.clone(), Some(inner))
                }
            };

        let runtime = Arc::new(PipelineRuntime::new(RuntimeHandles {
            registry,
            toolbox,
            llm: self.llm,
            accountant,
            sessions: self.sessions.clone(),
            events: self.events,
        }));

        Ok(AnalystService {
            root_display: root.display().to_string(),
            runtime,
            bounds_accountant,
            cache: ExplanationCache::new(self.sessions),
            seq: AtomicU64::new(0),
        })
    }
}

/// Service façade: wraps a query into an envelope, spawns its runtime task,
/// and hands back either the terminal payload or the event stream.
pub struct AnalystService {
    root_display: String,
    runtime: Arc<PipelineRuntime>,
    bounds_accountant: Option<Arc<BoundsAccountant>>,
    cache: ExplanationCache,
    seq: AtomicU64,
}

impl AnalystService {
    /// Open a project with default bounds and in-memory persistence.
    pub async fn open(root: &Path, llm: Arc<dyn LlmClient>) -> Result<Self> {
        ServiceBuilder::new(llm).build(root).await
    }

    pub fn builder(llm: Arc<dyn LlmClient>) -> ServiceBuilder {
        ServiceBuilder::new(llm)
    }

    fn next_request_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("req-{:x}-{seq}", now_ms())
    }

    /// Run a query to completion and return the terminal payload.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        if let Some(cached) = self.cache.get(&self.root_display, &request.query).await {
            log::debug!("explanation cache hit for {:?}", request.query);
            return Ok(cached);
        }

        let query = request.query.clone();
        let (handle, mut rx) = self.query_stream(request);
        let envelope = handle.task.await.context("runtime task panicked")?;

        let mut terminal = None;
        while let Some(event) = rx.recv().await {
            if let AnalysisEvent::Terminal(event) = event {
                terminal = Some(event.response);
            }
        }
        let response = terminal.unwrap_or_else(|| crate::runtime::terminal_response(&envelope));

        self.cache.put(&self.root_display, &query, &response).await;
        Ok(response)
    }

    /// Run a query and stream its stage events. The stream ends with exactly
    /// one terminal event; the handle's task resolves to the final envelope.
    pub fn query_stream(
        &self,
        request: QueryRequest,
    ) -> (QueryHandle, mpsc::UnboundedReceiver<AnalysisEvent>) {
        let request_id = self.next_request_id();
        let mut envelope = Envelope::new(&request_id, request.session_id.clone(), request.query);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        if let Some(options) = &request.options {
            if let Some(max_reintent) = options.max_reintent {
                envelope.set_max_reintent(max_reintent);
            }
            if let Some(deadline_ms) = options.deadline_ms {
                let deadline_cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(deadline_ms)).await;
                    deadline_cancel.cancel();
                });
            }
        }
        let runtime = Arc::clone(&self.runtime);
        let bounds_accountant = self.bounds_accountant.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let envelope = runtime.run(envelope, task_cancel, tx).await;
            if let Some(accountant) = bounds_accountant {
                accountant.release(&envelope.request_id);
            }
            envelope
        });

        (QueryHandle { cancel, task }, rx)
    }

    /// Re-emit the terminal event of a saved envelope. A terminated envelope
    /// performs no LLM or tool calls and writes nothing.
    pub fn replay(
        &self,
        envelope: Envelope,
    ) -> (JoinHandle<Envelope>, mpsc::UnboundedReceiver<AnalysisEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Arc::clone(&self.runtime);
        let task =
            tokio::spawn(async move { runtime.run(envelope, CancellationToken::new(), tx).await });
        (task, rx)
    }
}
