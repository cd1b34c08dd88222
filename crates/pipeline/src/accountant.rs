use analyst_protocol::ContextBounds;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Debug)]
pub struct QuotaCheck {
    pub ok: bool,
    pub reason: Option<String>,
}

impl QuotaCheck {
    pub fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    pub fn exceeded(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// Resource-tracking collaborator. The runtime records usage and honours
/// `check_quota` verdicts at stage boundaries; it never implements limits
/// itself. Production deployments plug in their own accounting kernel.
pub trait ResourceAccountant: Send + Sync {
    fn record_llm_call(&self, request_id: &str, tokens_in: u64, tokens_out: u64);
    fn record_tool_call(&self, request_id: &str, tool: &str);
    fn check_quota(&self, request_id: &str) -> QuotaCheck;
}

#[derive(Default, Clone, Copy)]
struct Counters {
    llm_calls: u64,
    tool_calls: u64,
}

/// In-process accountant driven by `ContextBounds`. LLM calls are capped
/// directly; agent hops are approximated by the total of recorded calls.
pub struct BoundsAccountant {
    bounds: ContextBounds,
    counters: Mutex<HashMap<String, Counters>>,
}

impl BoundsAccountant {
    pub fn new(bounds: ContextBounds) -> Self {
        Self {
            bounds,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn with_counters<R>(&self, request_id: &str, f: impl FnOnce(&mut Counters) -> R) -> R {
        let mut map = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        f(map.entry(request_id.to_string()).or_default())
    }

    /// Drop a finished request's counters.
    pub fn release(&self, request_id: &str) {
        let mut map = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(request_id);
    }
}

impl ResourceAccountant for BoundsAccountant {
    fn record_llm_call(&self, request_id: &str, _tokens_in: u64, _tokens_out: u64) {
        self.with_counters(request_id, |c| c.llm_calls += 1);
    }

    fn record_tool_call(&self, request_id: &str, _tool: &str) {
        self.with_counters(request_id, |c| c.tool_calls += 1);
    }

    fn check_quota(&self, request_id: &str) -> QuotaCheck {
        let counters = self.with_counters(request_id, |c| *c);
        if counters.llm_calls >= self.bounds.max_llm_calls_per_query {
            return QuotaCheck::exceeded(format!(
                "llm call budget exhausted ({}/{})",
                counters.llm_calls, self.bounds.max_llm_calls_per_query
            ));
        }
        let hops = counters.llm_calls + counters.tool_calls;
        if hops >= self.bounds.max_agent_hops_per_query {
            return QuotaCheck::exceeded(format!(
                "agent hop budget exhausted ({}/{})",
                hops, self.bounds.max_agent_hops_per_query
            ));
        }
        QuotaCheck::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_budget_trips_the_check() {
        let bounds = ContextBounds {
            max_llm_calls_per_query: 2,
            ..ContextBounds::default()
        };
        let accountant = BoundsAccountant::new(bounds);

        assert!(accountant.check_quota("r1").ok);
        accountant.record_llm_call("r1", 10, 10);
        accountant.record_llm_call("r1", 10, 10);
        let check = accountant.check_quota("r1");
        assert!(!check.ok);
        assert!(check.reason.expect("reason").contains("llm call budget"));

        // Other requests are unaffected.
        assert!(accountant.check_quota("r2").ok);
    }

    #[test]
    fn release_clears_counters() {
        let accountant = BoundsAccountant::new(ContextBounds {
            max_llm_calls_per_query: 1,
            ..ContextBounds::default()
        });
        accountant.record_llm_call("r1", 1, 1);
        assert!(!accountant.check_quota("r1").ok);
        accountant.release("r1");
        assert!(accountant.check_quota("r1").ok);
    }
}
