//! Deterministic test doubles. The scripted client is the supported way to
//! substitute the LLM in tests; nothing else in the pipeline is mockable.

use crate::llm::{Completion, CompletionOptions, LlmClient, LlmError};
use analyst_protocol::estimate_tokens;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Cross-test synchronization for process-wide state (env vars, cwd, etc.).
///
/// Rust tests run in parallel by default, but env vars are shared per-process.
/// Any test that mutates or depends on process-wide env should lock this mutex.
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

enum Scripted {
    Text(String),
    Timeout,
    Transport(String),
}

/// Replays a fixed sequence of completions. Requests beyond the script fail
/// with a transport error so an over-eager pipeline is caught immediately.
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Scripted>>,
    calls: AtomicU64,
    /// Cancelled right before the given 1-indexed call is answered.
    cancel_before_call: Mutex<Option<(u64, CancellationToken)>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted::Text(text.into()));
    }

    pub fn push_timeout(&self) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted::Timeout);
    }

    pub fn push_transport_error(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted::Transport(message.into()));
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cancel_before_call(&self, call: u64, token: CancellationToken) {
        *self
            .cancel_before_call
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some((call, token));
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = self
            .cancel_before_call
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            if call == *at {
                token.cancel();
            }
        }

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok(Completion {
                tokens_in: estimate_tokens(prompt) as u64,
                tokens_out: estimate_tokens(&text) as u64,
                text,
            }),
            Some(Scripted::Timeout) => Err(LlmError::Timeout),
            Some(Scripted::Transport(message)) => Err(LlmError::Transport(message)),
            None => Err(LlmError::Transport("script exhausted".to_string())),
        }
    }
}

/// Write the fixture repository used by the scenario suite. `login` lands on
/// line 42 of `src/auth/login.py`; `error_handler` on line 3 of
/// `src/errors.py`.
pub async fn write_fixture_repo(root: &Path) {
    let auth_dir = root.join("src/auth");
    tokio::fs::create_dir_all(&auth_dir)
        .await
        .expect("create src/auth");

    let mut login = String::from("\"\"\"Authentication entry points.\"\"\"\n");
    for i in 2..=40 {
        login.push_str(&format!("# session notes line {i}\n"));
    }
    login.push('\n');
    login.push_str("def login(user):\n    return check_password(user)\n");
    assert_eq!(login.lines().nth(41), Some("def login(user):"));
    tokio::fs::write(auth_dir.join("login.py"), login)
        .await
        .expect("write login.py");

    tokio::fs::write(
        root.join("src/errors.py"),
        "\"\"\"Error handling utilities.\"\"\"\n\ndef error_handler(err):\n    return format_error(err)\n\ndef format_error(err):\n    return str(err)\n",
    )
    .await
    .expect("write errors.py");

    tokio::fs::write(
        root.join("src/db.py"),
        "def connect(user):\n    # retries on transient error\n    return None\n",
    )
    .await
    .expect("write db.py");

    tokio::fs::write(
        root.join("src/app.py"),
        "from errors import error_handler\n\ndef main():\n    try:\n        run()\n    except Exception as err:\n        error_handler(err)\n",
    )
    .await
    .expect("write app.py");
}
