//! The error boundary between recorders and their callers.
//!
//! Recording is instrumentation: it must never fail or alter the operation
//! being measured. Internals return [`MonitorResult`]; this is the single
//! place those results are dropped, after being logged.

use std::future::Future;

use tracing::warn;

use crate::error::MonitorResult;

/// Await `fut`, log any error, and return its value if it succeeded.
pub async fn best_effort<T, F>(component: &'static str, operation: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = MonitorResult<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(component, operation, error = %e, "recording failed, continuing");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;

    #[tokio::test]
    async fn passes_through_success() {
        let out = best_effort("test", "ok", async { Ok::<_, MonitorError>(7) }).await;
        assert_eq!(out, Some(7));
    }

    #[tokio::test]
    async fn swallows_failure() {
        let out = best_effort("test", "fail", async {
            Err::<u32, _>(MonitorError::InvalidSample("nan".into()))
        })
        .await;
        assert_eq!(out, None);
    }
}
