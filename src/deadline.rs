//! Per-call deadline and cancellation handling.
//!
//! Every outbound call runs under a fresh [`CallContext`]: one cancellation
//! token and one deadline, neither shared with any other call. The deadline
//! future is owned by the call and dropped with it, so a retried operation
//! can never inherit a stale timer from a previous attempt.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Default per-call deadline: 300 000 ms.
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Deadline plus cancellation token scoped to a single call.
///
/// The deadline is anchored at construction time, so every stage of a call
/// (connection setup, then stream iteration) draws from the same budget
/// instead of restarting the clock.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub timeout: Duration,
    pub cancel: CancellationToken,
    started: Instant,
}

impl CallContext {
    /// Fresh context with the given deadline and its own token.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    /// Fresh context with the given deadline and a caller-supplied token.
    pub fn with_cancel(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            timeout,
            cancel,
            started: Instant::now(),
        }
    }

    /// Instant at which the call expires, measured from construction.
    pub fn deadline(&self) -> Instant {
        self.started + self.timeout
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::with_timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

/// Drives `fut` to completion under the context's deadline and token.
///
/// An expired deadline or a cancelled token aborts the in-flight future
/// (dropping it tears down the underlying transport) and surfaces as
/// [`LlmError::Timeout`], which the retry classifier always treats as
/// transient.
pub async fn enforce<T, Fut>(ctx: &CallContext, fut: Fut) -> Result<T, LlmError>
where
    Fut: Future<Output = Result<T, LlmError>>,
{
    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(LlmError::timeout("call cancelled by caller")),
        outcome = tokio::time::timeout_at(ctx.deadline(), fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(LlmError::timeout(format!(
                "call exceeded deadline of {}ms",
                ctx.timeout.as_millis()
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_surfaces_as_timeout() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        let result: Result<(), _> = enforce(&ctx, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        let err = result.expect_err("should time out");
        assert!(err.is_timeout());
        assert!(err.message().contains("50ms"), "message: {}", err.message());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_anchored_at_context_creation() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let remaining = Instant::now();
        let result: Result<(), _> = enforce(&ctx, std::future::pending()).await;
        assert!(result.expect_err("should time out").is_timeout());
        assert_eq!(remaining.elapsed(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_timeout() {
        let ctx = CallContext::default();
        ctx.cancel.cancel();
        let result: Result<(), _> = enforce(&ctx, std::future::pending()).await;
        assert!(result.expect_err("should cancel").is_timeout());
    }

    #[tokio::test]
    async fn completed_call_passes_through() {
        let ctx = CallContext::default();
        let value = enforce(&ctx, async { Ok(7u32) }).await.expect("ok");
        assert_eq!(value, 7);
    }
}
