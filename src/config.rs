//! Rate-limit configuration resolution.
//!
//! Configuration is resolved once, up front, into a [`RateLimitConfig`] that
//! the middleware reads on every request without further merging.
//!
//! Semantics:
//! - Every field has a documented default; the builder starts from those and
//!   each setter overwrites exactly one field.
//! - Resolution is explicit-over-default per field: an untouched field keeps
//!   its default, a set field keeps the caller's value.
//! - `build` validates the merged result. Explicitly configured zero rates,
//!   zero windows, and empty key prefixes are rejected as [`ConfigError`]s
//!   rather than silently replaced.
//! - The engine handle is the one field with no default; omitting it is a
//!   [`ConfigError::MissingEngine`].
//!
//! Invariants:
//! - After a successful `build`, `rate`, `burst`, and `period` are all
//!   non-zero and `key_prefix` is non-empty.
//! - Resolution is pure: the same inputs always produce an equivalent
//!   configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crate::clock::{Clock, SystemClock};
use crate::engine::{Algorithm, EngineError, Limit, RateEngine};
use crate::middleware::client_ip;

/// Steady-state requests allowed per [`DEFAULT_PERIOD`] when unconfigured.
pub const DEFAULT_MAX_RATE: u64 = 10;
/// Burst allowance when unconfigured.
pub const DEFAULT_BURST: u64 = 10;
/// Window over which [`DEFAULT_MAX_RATE`] applies.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);
/// Namespace prepended to every derived rate-limit key.
pub const DEFAULT_KEY_PREFIX: &str = "gatelimit";
/// Body of the default denial response.
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

/// Predicate deciding whether a request bypasses rate limiting entirely.
pub type SkipFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;
/// Derives the caller identity a request is counted under.
pub type KeyFn = Arc<dyn Fn(&Request) -> String + Send + Sync>;
/// Produces the denial response for callers over their allotment.
pub type DenyHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;
/// Produces the response returned when the engine call itself fails.
pub type ErrorHandler = Arc<dyn Fn(&EngineError, &Request) -> Response + Send + Sync>;

/// How the middleware reacts when the engine call fails.
///
/// This is an availability-versus-enforcement trade-off: fail-open keeps
/// serving traffic unlimited while the engine is down, fail-closed refuses
/// traffic it cannot meter.
#[derive(Clone)]
pub enum EngineFailurePolicy {
    /// Treat the failure as an allow and forward the request.
    FailOpen,
    /// Short-circuit with the handler's response instead of forwarding.
    FailClosed(ErrorHandler),
}

impl EngineFailurePolicy {
    /// Resolve the two surface options into one policy.
    ///
    /// `skip_on_engine_error` wins over any configured handler; with it unset,
    /// a missing handler falls back to a generic internal-error response.
    pub fn from_parts(skip_on_engine_error: bool, on_engine_error: Option<ErrorHandler>) -> Self {
        if skip_on_engine_error {
            EngineFailurePolicy::FailOpen
        } else {
            EngineFailurePolicy::FailClosed(
                on_engine_error.unwrap_or_else(default_engine_error_handler),
            )
        }
    }

    /// Whether engine failures are treated as allows.
    pub fn is_fail_open(&self) -> bool {
        matches!(self, EngineFailurePolicy::FailOpen)
    }
}

impl fmt::Debug for EngineFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineFailurePolicy::FailOpen => f.write_str("FailOpen"),
            EngineFailurePolicy::FailClosed(_) => {
                f.debug_tuple("FailClosed").field(&"<handler>").finish()
            }
        }
    }
}

/// Errors produced while resolving a rate-limit configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No engine handle was supplied.
    #[error("rate-limit engine is required")]
    MissingEngine,
    /// `max_rate` was explicitly set to zero.
    #[error("max_rate must be > 0")]
    InvalidMaxRate,
    /// `burst` was explicitly set to zero.
    #[error("burst must be > 0")]
    InvalidBurst,
    /// `period` was explicitly set to zero.
    #[error("period must be > 0")]
    InvalidPeriod,
    /// `key_prefix` was explicitly set to an empty string.
    #[error("key_prefix must not be empty")]
    EmptyKeyPrefix,
}

/// Fully resolved rate-limit configuration.
///
/// Produced by [`RateLimitConfigBuilder::build`]; every field is already
/// merged and validated, so the middleware reads it without fallbacks. Cloning
/// is cheap and clones share the same engine handle.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub(crate) engine: Arc<dyn RateEngine>,
    pub(crate) limit: Limit,
    pub(crate) key_prefix: String,
    pub(crate) status_code: StatusCode,
    pub(crate) message: String,
    pub(crate) skip: SkipFn,
    pub(crate) key_fn: KeyFn,
    pub(crate) on_limit_reached: DenyHandler,
    pub(crate) failure_policy: EngineFailurePolicy,
    pub(crate) clock: Arc<dyn Clock>,
}

impl RateLimitConfig {
    /// Construct a new builder with defaults.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    /// Default configuration around the given engine handle.
    pub fn new(engine: Arc<dyn RateEngine>) -> Self {
        Self::builder()
            .engine(engine)
            .build()
            .expect("default configuration is valid")
    }

    /// The allotment handed to the engine on every call.
    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    /// Namespace prepended to every derived key.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Status used by the default denial response.
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// Body used by the default denial response.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Behavior when the engine call fails.
    pub fn failure_policy(&self) -> &EngineFailurePolicy {
        &self.failure_policy
    }
}

impl fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("limit", &self.limit)
            .field("key_prefix", &self.key_prefix)
            .field("status_code", &self.status_code)
            .field("message", &self.message)
            .field("failure_policy", &self.failure_policy)
            .field("skip", &"<predicate>")
            .field("key_fn", &"<fn>")
            .field("on_limit_reached", &"<handler>")
            .finish()
    }
}

/// Builder for [`RateLimitConfig`].
pub struct RateLimitConfigBuilder {
    engine: Option<Arc<dyn RateEngine>>,
    max_rate: u64,
    burst: u64,
    period: Duration,
    algorithm: Algorithm,
    key_prefix: String,
    status_code: StatusCode,
    message: String,
    skip: SkipFn,
    key_fn: KeyFn,
    on_limit_reached: Option<DenyHandler>,
    on_engine_error: Option<ErrorHandler>,
    skip_on_engine_error: bool,
    clock: Arc<dyn Clock>,
}

impl RateLimitConfigBuilder {
    /// Create a builder with the documented defaults.
    pub fn new() -> Self {
        Self {
            engine: None,
            max_rate: DEFAULT_MAX_RATE,
            burst: DEFAULT_BURST,
            period: DEFAULT_PERIOD,
            algorithm: Algorithm::default(),
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            status_code: StatusCode::TOO_MANY_REQUESTS,
            message: DEFAULT_MESSAGE.to_owned(),
            skip: Arc::new(|_| false),
            key_fn: Arc::new(client_ip),
            on_limit_reached: None,
            on_engine_error: None,
            skip_on_engine_error: false,
            clock: Arc::new(SystemClock),
        }
    }

    /// Handle to the engine that answers allow/deny for every request.
    pub fn engine(mut self, engine: Arc<dyn RateEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Steady-state requests allowed per `period`. Must be > 0.
    pub fn max_rate(mut self, max_rate: u64) -> Self {
        self.max_rate = max_rate;
        self
    }

    /// Instantaneous allowance above the steady rate. Must be > 0.
    pub fn burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    /// Window over which `max_rate` applies. Must be > 0.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Counting strategy identifier forwarded to the engine.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Namespace prepended to every derived key. Must not be empty.
    pub fn key_prefix<P>(mut self, key_prefix: P) -> Self
    where
        P: Into<String>,
    {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Status for the default denial response.
    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    /// Body for the default denial response.
    pub fn message<M>(mut self, message: M) -> Self
    where
        M: Into<String>,
    {
        self.message = message.into();
        self
    }

    /// Predicate to exempt requests from rate limiting.
    pub fn skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Arc::new(skip);
        self
    }

    /// Derive the caller identity a request is counted under.
    pub fn key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(key_fn);
        self
    }

    /// Produce the denial response for callers over their allotment.
    ///
    /// Replaces the default `status_code` + `message` response entirely. The
    /// middleware still stamps the retry header onto whatever this returns.
    pub fn on_limit_reached<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.on_limit_reached = Some(Arc::new(handler));
        self
    }

    /// Produce the response returned when the engine call itself fails.
    ///
    /// Ignored when `skip_on_engine_error` is set.
    pub fn on_engine_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&EngineError, &Request) -> Response + Send + Sync + 'static,
    {
        self.on_engine_error = Some(Arc::new(handler));
        self
    }

    /// Forward requests unlimited instead of refusing them when the engine
    /// call fails.
    pub fn skip_on_engine_error(mut self, skip_on_engine_error: bool) -> Self {
        self.skip_on_engine_error = skip_on_engine_error;
        self
    }

    /// Provide a custom clock implementation.
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Build the configuration, validating inputs.
    pub fn build(self) -> Result<RateLimitConfig, ConfigError> {
        let engine = self.engine.ok_or(ConfigError::MissingEngine)?;
        if self.max_rate == 0 {
            return Err(ConfigError::InvalidMaxRate);
        }
        if self.burst == 0 {
            return Err(ConfigError::InvalidBurst);
        }
        if self.period.is_zero() {
            return Err(ConfigError::InvalidPeriod);
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::EmptyKeyPrefix);
        }

        let on_limit_reached = self.on_limit_reached.unwrap_or_else(|| {
            let status_code = self.status_code;
            let message = self.message.clone();
            Arc::new(move |_req: &Request| (status_code, message.clone()).into_response())
        });

        Ok(RateLimitConfig {
            engine,
            limit: Limit {
                rate: self.max_rate,
                burst: self.burst,
                period: self.period,
                algorithm: self.algorithm,
            },
            key_prefix: self.key_prefix,
            status_code: self.status_code,
            message: self.message,
            skip: self.skip,
            key_fn: self.key_fn,
            on_limit_reached,
            failure_policy: EngineFailurePolicy::from_parts(
                self.skip_on_engine_error,
                self.on_engine_error,
            ),
            clock: self.clock,
        })
    }
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_engine_error_handler() -> ErrorHandler {
    Arc::new(|_err: &EngineError, _req: &Request| {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_owned()).into_response()
    })
}
