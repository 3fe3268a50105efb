//! Polled readiness predicates.

use crate::errors::{E2eError, E2eResult};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Future returned by a condition's predicate.
pub type ProbeFuture = BoxFuture<'static, E2eResult<bool>>;

type Probe = Box<dyn Fn() -> ProbeFuture + Send + Sync>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// A predicate evaluated from scratch on every poll tick.
///
/// A predicate that returns an error is treated as "not yet ready"; the error
/// text becomes the last observed state reported on timeout.
pub struct Condition {
    description: String,
    probe: Probe,
    timeout: Duration,
    interval: Duration,
}

impl Condition {
    /// Creates a condition with the default timeout (3m) and interval (10s).
    pub fn new<F, Fut>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = E2eResult<bool>> + Send + 'static,
    {
        Self {
            description: description.into(),
            probe: Box::new(move || Box::pin(predicate())),
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Sets the maximum time to wait.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the time between evaluations.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// What is being waited on.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Maximum time to wait.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time between evaluations.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Rejects a zero interval or an interval not shorter than the timeout.
    pub fn validate(&self) -> E2eResult<()> {
        if self.interval.is_zero() {
            return Err(E2eError::config(format!(
                "condition '{}': interval must be positive",
                self.description
            )));
        }
        if self.interval >= self.timeout {
            return Err(E2eError::config(format!(
                "condition '{}': interval {:?} must be less than timeout {:?}",
                self.description, self.interval, self.timeout
            )));
        }
        Ok(())
    }

    pub(crate) fn evaluate(&self) -> ProbeFuture {
        (self.probe)()
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("description", &self.description)
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let condition = Condition::new("always", || async { Ok(true) });
        assert_eq!(condition.timeout(), Duration::from_secs(180));
        assert_eq!(condition.interval(), Duration::from_secs(10));
        assert!(condition.validate().is_ok());
    }

    #[test]
    fn test_interval_not_below_timeout_rejected() {
        let condition = Condition::new("slow", || async { Ok(true) })
            .with_timeout(Duration::from_secs(1))
            .with_interval(Duration::from_secs(1));
        let err = condition.validate().unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("must be less than"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let condition =
            Condition::new("busy", || async { Ok(true) }).with_interval(Duration::ZERO);
        assert!(condition.validate().is_err());
    }

    #[tokio::test]
    async fn test_evaluate_runs_predicate_each_time() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let condition = Condition::new("count", move || {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move { Ok(n >= 1) }
        });

        assert!(!condition.evaluate().await.unwrap());
        assert!(condition.evaluate().await.unwrap());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
