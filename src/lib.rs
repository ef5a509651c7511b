#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Gatelimit 🚦
//!
//! Rate-limit gating middleware for axum and tower: every request is checked
//! against a pluggable decision engine before it reaches your handlers.
//!
//! ## Features
//!
//! - **Engine-agnostic gating** via the [`RateEngine`] trait (in-process,
//!   Redis, or anything else that can answer allow/deny)
//! - **Quota headers** on allowed responses and an absolute `retry-after`
//!   timestamp on denials
//! - **Per-caller keys** derived from the client address by default, with
//!   custom key functions and skip predicates
//! - **Fail-open or fail-closed** behavior when the engine itself is down
//! - **Resolved configuration** with validated, documented defaults
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use axum::{routing::get, Router};
//! use gatelimit::{
//!     Algorithm, Decision, EngineError, Limit, RateEngine, RateLimitConfig, RateLimitLayer,
//! };
//!
//! // In-process stand-in; production engines usually wrap a shared store.
//! #[derive(Debug)]
//! struct Unlimited;
//!
//! #[async_trait::async_trait]
//! impl RateEngine for Unlimited {
//!     async fn allow(&self, _key: &str, limit: &Limit) -> Result<Decision, EngineError> {
//!         Ok(Decision::Allowed { remaining: limit.burst, reset_after: limit.period })
//!     }
//! }
//!
//! let config = RateLimitConfig::builder()
//!     .engine(Arc::new(Unlimited))
//!     .max_rate(3)
//!     .burst(3)
//!     .period(Duration::from_secs(10))
//!     .algorithm(Algorithm::Gcra)
//!     .build()
//!     .unwrap();
//!
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "Hello, World!" }))
//!     .layer(RateLimitLayer::with_config(config));
//! # let _ = app;
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod middleware;

// Re-exports
pub use clock::{Clock, SystemClock};
pub use config::{
    ConfigError, DenyHandler, EngineFailurePolicy, ErrorHandler, KeyFn, RateLimitConfig,
    RateLimitConfigBuilder, SkipFn, DEFAULT_BURST, DEFAULT_KEY_PREFIX, DEFAULT_MAX_RATE,
    DEFAULT_MESSAGE, DEFAULT_PERIOD,
};
pub use engine::{Algorithm, Decision, EngineError, Limit, RateEngine};
pub use middleware::{client_ip, headers, RateLimitLayer, RateLimitService};
