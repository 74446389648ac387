//! Per-route deadlines.
//!
//! [`DeadlineGuard::run`] races a handler future against a tokio timer. The
//! effective limit is, in order of precedence:
//!
//! 1. the route's own maximum duration
//! 2. the configured default
//! 3. [`FALLBACK_TIMEOUT`] (one minute)
//!
//! When the timer wins, the handler future is dropped at its next suspension
//! point. Tasks the handler spawned are not cancelled; they keep running
//! detached and anything they try to attach to the request's span tree is
//! rejected once the pipeline has finalized.

use std::future::Future;
use std::time::Duration;
use vigil_core::{RequestContext, TimeoutError};

/// Deadline used when nothing else is configured.
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Races handlers against their deadline.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineGuard {
    default_timeout: Duration,
}

impl Default for DeadlineGuard {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DeadlineGuard {
    /// Creates a guard with a configured default, or the one-minute fallback.
    #[must_use]
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self {
            default_timeout: default_timeout.unwrap_or(FALLBACK_TIMEOUT),
        }
    }

    /// The default applied when a route has no override.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Resolves the limit for one request.
    #[must_use]
    pub fn effective_timeout(&self, timeout_override: Option<Duration>) -> Duration {
        timeout_override.unwrap_or(self.default_timeout)
    }

    /// Runs `handler` under the effective deadline.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the deadline fires first. The error names
    /// the route template, or the request path when no route is attached.
    pub async fn run<F>(
        &self,
        ctx: &RequestContext,
        timeout_override: Option<Duration>,
        handler: F,
    ) -> Result<F::Output, TimeoutError>
    where
        F: Future,
    {
        let limit = self.effective_timeout(timeout_override);

        match tokio::time::timeout(limit, handler).await {
            Ok(output) => Ok(output),
            Err(_) => {
                let route = ctx
                    .route()
                    .map_or_else(|| ctx.path().to_string(), |r| r.template().to_string());
                tracing::warn!(
                    traceid = %ctx.trace_id(),
                    http.route = %route,
                    limit_ms = limit.as_millis() as u64,
                    "Request deadline exceeded"
                );
                Err(TimeoutError::new(limit, route))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::RouteConfig;

    fn ctx() -> RequestContext {
        RequestContext::begin(None)
            .with_path("/cats/1")
            .with_route(RouteConfig::new("GET", "/cats/:id", "cats", "find_one"))
    }

    #[test]
    fn test_effective_timeout_precedence() {
        let guard = DeadlineGuard::new(Some(Duration::from_secs(30)));
        assert_eq!(guard.effective_timeout(None), Duration::from_secs(30));
        assert_eq!(
            guard.effective_timeout(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );

        assert_eq!(DeadlineGuard::default().effective_timeout(None), FALLBACK_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_wins() {
        let guard = DeadlineGuard::default();
        let result = guard
            .run(&ctx(), Some(Duration::from_secs(5)), async {
                tokio::time::sleep(Duration::from_secs(4)).await;
                42
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_wins() {
        let guard = DeadlineGuard::default();
        let err = guard
            .run(&ctx(), Some(Duration::from_secs(5)), async {
                tokio::time::sleep(Duration::from_secs(6)).await;
            })
            .await
            .unwrap_err();

        assert_eq!(err.limit, Duration::from_secs(5));
        assert_eq!(err.route, "/cats/:id");
        assert_eq!(err.limit_ms(), 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_dropped_on_timeout() {
        struct Flag(std::sync::Arc<std::sync::atomic::AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let dropped = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Flag(dropped.clone());
        let guard = DeadlineGuard::default();

        let result = guard
            .run(&ctx(), Some(Duration::from_millis(10)), async move {
                let _flag = flag;
                std::future::pending::<()>().await;
            })
            .await;

        assert!(result.is_err());
        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_less_timeout_uses_path() {
        let ctx = RequestContext::begin(None).with_path("/health");
        let err = DeadlineGuard::new(Some(Duration::from_millis(1)))
            .run(&ctx, None, std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(err.route, "/health");
    }
}
