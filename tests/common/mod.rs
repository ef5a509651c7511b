use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use gatelimit::{Clock, Decision, EngineError, Limit, RateEngine};

/// Scripted engine double that records every call it receives.
#[derive(Debug)]
pub struct MockEngine {
    script: Mutex<VecDeque<Result<Decision, String>>>,
    fallback: Result<Decision, String>,
    calls: AtomicUsize,
    seen_keys: Mutex<Vec<String>>,
    seen_limits: Mutex<Vec<Limit>>,
}

impl MockEngine {
    fn with_fallback(fallback: Result<Decision, String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            seen_keys: Mutex::new(Vec::new()),
            seen_limits: Mutex::new(Vec::new()),
        }
    }

    /// Engine that always allows with the given quota state.
    pub fn allowing(remaining: u64, reset_after: Duration) -> Self {
        Self::with_fallback(Ok(Decision::Allowed { remaining, reset_after }))
    }

    /// Engine that always denies with the given wait.
    pub fn denying(retry_after: Duration) -> Self {
        Self::with_fallback(Ok(Decision::Denied { retry_after }))
    }

    /// Engine whose calls always fail, as if the store were unreachable.
    pub fn failing(error: &str) -> Self {
        Self::with_fallback(Err(error.to_owned()))
    }

    /// Queue one decision to return ahead of the fallback.
    pub fn push(&self, decision: Decision) {
        self.script.lock().unwrap().push_back(Ok(decision));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_keys(&self) -> Vec<String> {
        self.seen_keys.lock().unwrap().clone()
    }

    pub fn seen_limits(&self) -> Vec<Limit> {
        self.seen_limits.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RateEngine for MockEngine {
    async fn allow(&self, key: &str, limit: &Limit) -> Result<Decision, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_keys.lock().unwrap().push(key.to_owned());
        self.seen_limits.lock().unwrap().push(limit.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(EngineError::from)
    }
}

/// Clock double pinned to a fixed point in time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Duration,
}

impl ManualClock {
    pub fn at(epoch_secs: u64) -> Self {
        Self { now: Duration::from_secs(epoch_secs) }
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> Duration {
        self.now
    }
}
