//! Tower middleware that gates requests behind a rate-limit engine.
//!
//! Semantics, per request:
//! - The skip predicate runs first; exempt requests are forwarded untouched,
//!   with no engine call and no headers.
//! - Everything else costs exactly one engine call, keyed by
//!   `"{key_prefix}:{key_fn(request)}"`.
//! - Allowed requests are forwarded, and the response gains
//!   `x-ratelimit-limit`, `x-ratelimit-remaining`, and `x-ratelimit-reset`.
//! - Denied requests never reach the inner service; the denial handler's
//!   response is returned with `retry-after` stamped on it.
//! - Engine failures are logged, then resolved by the configured
//!   [`EngineFailurePolicy`]: forward unlimited (fail-open) or answer with
//!   the error handler's response (fail-closed).
//!
//! The `x-ratelimit-reset` and `retry-after` values are absolute Unix
//! timestamps in seconds, not relative waits. Dropping the response future
//! cancels an in-flight engine call along with the request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request};
use axum::response::Response;
use futures::future::BoxFuture;
use http::HeaderValue;
use tower_layer::Layer;
use tower_service::Service;

use crate::config::{EngineFailurePolicy, RateLimitConfig};
use crate::engine::{Decision, RateEngine};

/// Response header names written by the middleware.
///
/// Lowercase on the wire; header lookups are case-insensitive anyway.
pub mod headers {
    /// Ceiling for the caller's window. Set when a request is allowed.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Quota left in the current window. Set when a request is allowed.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Unix second at which the window fully replenishes. Set when allowed.
    pub const RESET: &str = "x-ratelimit-reset";
    /// Unix second at which the caller may retry. Set when denied.
    pub const RETRY_AFTER: &str = "retry-after";
}

/// A layer that gates requests behind a [`RateEngine`] decision.
#[derive(Clone, Debug)]
pub struct RateLimitLayer {
    config: RateLimitConfig,
}

impl RateLimitLayer {
    /// Gate with the default configuration around the given engine handle.
    pub fn new(engine: Arc<dyn RateEngine>) -> Self {
        Self { config: RateLimitConfig::new(engine) }
    }

    /// Gate with a resolved configuration.
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            config: self.config.clone(),
        }
    }
}

/// Middleware service that gates requests behind a rate-limit decision.
#[derive(Clone, Debug)]
pub struct RateLimitService<S> {
    inner: S,
    config: RateLimitConfig,
}

impl<S> Service<Request> for RateLimitService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let config = self.config.clone();
        // Readiness belongs to the polled instance, not its clones: take the
        // instance `poll_ready` readied and leave a clone for the next cycle.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if (config.skip)(&req) {
                return inner.call(req).await;
            }

            let key = format!("{}:{}", config.key_prefix, (config.key_fn)(&req));

            let decision = match config.engine.allow(&key, &config.limit).await {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::error!(key = %key, error = %err, "Rate-limit engine call failed");
                    return match &config.failure_policy {
                        EngineFailurePolicy::FailOpen => inner.call(req).await,
                        EngineFailurePolicy::FailClosed(on_engine_error) => {
                            Ok(on_engine_error(&err, &req))
                        }
                    };
                }
            };

            match decision {
                Decision::Allowed { remaining, reset_after } => {
                    // Reset is anchored to decision time, not to when the
                    // inner service finishes.
                    let reset_at = config.clock.now_unix().saturating_add(reset_after);
                    let mut response = inner.call(req).await?;
                    response.headers_mut().insert(headers::LIMIT, HeaderValue::from(config.limit.rate));
                    response.headers_mut().insert(headers::REMAINING, HeaderValue::from(remaining));
                    response.headers_mut().insert(headers::RESET, epoch_secs(reset_at));
                    Ok(response)
                }
                Decision::Denied { retry_after } => {
                    tracing::debug!(
                        key = %key,
                        retry_after_secs = retry_after.as_secs(),
                        "Rate limit exceeded"
                    );
                    let mut response = (config.on_limit_reached)(&req);
                    let retry_at = config.clock.now_unix().saturating_add(retry_after);
                    // Insert, not append: the handler cannot unset this.
                    response.headers_mut().insert(headers::RETRY_AFTER, epoch_secs(retry_at));
                    Ok(response)
                }
            }
        })
    }
}

fn epoch_secs(at: Duration) -> HeaderValue {
    HeaderValue::from(at.as_secs())
}

/// Resolve the client address a request is counted under by default.
///
/// Checks the first `x-forwarded-for` entry, then `x-real-ip`, then the
/// connection's peer address; requests with none of those share one
/// `"unknown"` bucket. The forwarding headers are client-controlled unless a
/// trusted proxy strips them, so deployments not behind such a proxy should
/// configure a key function that suits their topology.
pub fn client_ip(req: &Request) -> String {
    let forwarded = header_str(req, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_owned();
    }

    let real_ip = header_str(req, "x-real-ip").map(str::trim).filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_owned();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}
