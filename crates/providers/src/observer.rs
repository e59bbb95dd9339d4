//! Attempt observers shipped with the providers crate.

use replyforge_core::provider::{AttemptObserver, ProviderAttempt};

/// Logs every provider attempt via `tracing`.
pub struct TracingObserver;

impl AttemptObserver for TracingObserver {
    fn on_attempt(&self, attempt: &ProviderAttempt) {
        if attempt.success {
            tracing::info!(
                provider = %attempt.provider,
                elapsed_ms = attempt.elapsed_ms,
                "ATTEMPT ok"
            );
        } else {
            tracing::warn!(
                provider = %attempt.provider,
                elapsed_ms = attempt.elapsed_ms,
                error = %attempt.error,
                "ATTEMPT failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn observer_accepts_both_outcomes() {
        let observer = TracingObserver;
        observer.on_attempt(&ProviderAttempt::succeeded("a", Duration::from_millis(3)));
        observer.on_attempt(&ProviderAttempt::failed("b", Duration::ZERO, "boom"));
    }
}
