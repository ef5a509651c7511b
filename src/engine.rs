//! Decision protocol between the middleware and a rate-limit engine.
//!
//! This module provides the contract the middleware consults once per gated
//! request:
//! - [`RateEngine`]: The core trait an engine backend implements.
//! - [`Limit`]: The caller allotment handed to the engine on every call.
//! - [`Decision`]: The engine's verdict (Allowed/Denied) plus quota state.
//!
//! # Architecture
//!
//! The middleware doesn't know *how* counting works, only that it can ask an
//! engine. Implementations own the algorithm and the counter store, which is
//! what allows in-process engines and shared backends (e.g., Redis) to be
//! swapped without touching the HTTP layer.

use std::fmt;
use std::time::Duration;

/// Error surfaced by an engine call (store or transport failure).
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Identifier selecting which counting strategy the engine should apply.
///
/// Opaque to the middleware: it is carried inside [`Limit`] and never
/// interpreted on the HTTP side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Count requests within a moving window.
    #[default]
    SlidingWindow,
    /// Generic cell rate algorithm (leaky-bucket style pacing).
    Gcra,
    /// Engine-specific strategy name.
    Other(String),
}

impl Algorithm {
    /// Stable identifier for the strategy, usable in engine wire protocols.
    pub fn as_str(&self) -> &str {
        match self {
            Algorithm::SlidingWindow => "sliding-window",
            Algorithm::Gcra => "gcra",
            Algorithm::Other(name) => name,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-caller allotment, passed unchanged to the engine on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limit {
    /// Steady-state requests allowed per `period`.
    pub rate: u64,
    /// Instantaneous allowance above the steady rate.
    pub burst: u64,
    /// Window over which `rate` applies.
    pub period: Duration,
    /// Counting strategy the engine should apply.
    pub algorithm: Algorithm,
}

/// The decision returned by a rate-limit engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed {
        /// Quota left in the current window after this request.
        /// Useful for `X-RateLimit-Remaining` headers.
        remaining: u64,
        /// How long until the window's quota fully replenishes.
        /// Useful for `X-RateLimit-Reset` headers.
        reset_after: Duration,
    },
    /// The request is denied.
    Denied {
        /// How long the caller should wait before retrying.
        /// Useful for `Retry-After` headers.
        retry_after: Duration,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Core interface for rate-limit engines.
///
/// Each successful call counts one request against `key`'s quota and reports
/// whether that request may proceed. Implementations must be safe under
/// concurrent invocation, for the same key and across keys; the middleware
/// shares one engine handle between every request it gates.
#[async_trait::async_trait]
pub trait RateEngine: Send + Sync {
    /// Count one request against `key` and decide whether it may proceed.
    async fn allow(&self, key: &str, limit: &Limit) -> Result<Decision, EngineError>;
}
