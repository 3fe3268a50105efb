//! The polling loop.

use super::Condition;
use crate::cancellation::CancellationToken;
use crate::errors::{E2eError, E2eResult, TimeoutError};
use std::time::Instant;
use tracing::{debug, info};

/// Waits until `condition` holds.
///
/// The predicate is evaluated immediately, then once per interval. Sleeps are
/// clamped so the final evaluation happens at the deadline rather than after
/// it. Each evaluation is cut off at the deadline and counts as "not ready"
/// when it is. The token is raced against every evaluation and every sleep.
pub async fn wait_for(condition: &Condition, cancel: &CancellationToken) -> E2eResult<()> {
    condition.validate()?;

    let start = Instant::now();
    let deadline = start + condition.timeout();
    let mut attempts = 0u32;
    let mut last_state = String::from("never evaluated");

    info!(
        condition = condition.description(),
        timeout_secs = condition.timeout().as_secs_f64(),
        interval_secs = condition.interval().as_secs_f64(),
        "Waiting for condition"
    );

    loop {
        cancel.check()?;
        attempts += 1;

        let evaluation = tokio::time::timeout_at(
            tokio::time::Instant::from_std(deadline),
            condition.evaluate(),
        );
        let evaluated = tokio::select! {
            result = evaluation => result,
            () = cancel.cancelled() => return Err(cancelled(cancel)),
        };

        match evaluated {
            Ok(Ok(true)) => {
                info!(
                    condition = condition.description(),
                    attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Condition met"
                );
                return Ok(());
            }
            Ok(Ok(false)) => {
                last_state = format!("not satisfied after {attempts} attempt(s)");
            }
            Ok(Err(e)) => {
                last_state = e.to_string();
            }
            Err(_) => {
                last_state = format!("attempt {attempts} still running at the deadline");
            }
        }
        debug!(condition = condition.description(), attempts, state = %last_state, "Condition not yet met");

        let now = Instant::now();
        if now >= deadline {
            return Err(
                TimeoutError::new(condition.description(), condition.timeout(), last_state).into(),
            );
        }

        let nap = condition.interval().min(deadline - now);
        tokio::select! {
            () = tokio::time::sleep(nap) => {}
            () = cancel.cancelled() => return Err(cancelled(cancel)),
        }
    }
}

fn cancelled(cancel: &CancellationToken) -> E2eError {
    E2eError::Cancelled(cancel.reason().unwrap_or_else(|| "cancelled".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CommandExecutionError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_true_returns_on_first_tick() {
        let condition = Condition::new("ready", || async { Ok(true) })
            .with_timeout(Duration::from_secs(5))
            .with_interval(Duration::from_secs(1));

        let start = Instant::now();
        wait_for(&condition, &CancellationToken::new()).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_false_times_out_at_deadline() {
        let condition = Condition::new("never", || async { Ok(false) })
            .with_timeout(Duration::from_secs(2))
            .with_interval(Duration::from_secs(1));

        let start = Instant::now();
        let err = wait_for(&condition, &CancellationToken::new()).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2900));
        match err {
            E2eError::Timeout(e) => {
                assert_eq!(e.description, "never");
                assert!(e.last_state.contains("3 attempt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_sleep_never_overshoots_deadline() {
        let condition = Condition::new("never", || async { Ok(false) })
            .with_timeout(Duration::from_millis(300))
            .with_interval(Duration::from_millis(200));

        let start = Instant::now();
        let _ = wait_for(&condition, &CancellationToken::new()).await;
        assert!(start.elapsed() < Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_predicate_errors_become_last_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let condition = Condition::new("deployment", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(E2eError::from(CommandExecutionError::non_zero(
                    "kubectl get deployment",
                    1,
                    "NotFound",
                )))
            }
        })
        .with_timeout(Duration::from_millis(250))
        .with_interval(Duration::from_millis(100));

        let err = wait_for(&condition, &CancellationToken::new()).await.unwrap_err();
        assert!(calls.load(Ordering::SeqCst) >= 2);
        match err {
            E2eError::Timeout(e) => assert!(e.last_state.contains("NotFound")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_becomes_true_after_a_few_ticks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let condition = Condition::new("eventually", move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n >= 2) }
        })
        .with_timeout(Duration::from_secs(2))
        .with_interval(Duration::from_millis(50));

        wait_for(&condition, &CancellationToken::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_sleep() {
        let condition = Condition::new("never", || async { Ok(false) })
            .with_timeout(Duration::from_secs(60))
            .with_interval(Duration::from_secs(30));
        let token = Arc::new(CancellationToken::new());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel("operator interrupt");
        });

        let start = Instant::now();
        let err = wait_for(&condition, &token).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, E2eError::Cancelled(ref r) if r == "operator interrupt"));
    }

    #[tokio::test]
    async fn test_slow_predicate_is_cut_off_at_deadline() {
        let condition = Condition::new("hung predicate", || async {
            tokio::time::sleep(Duration::from_secs(6)).await;
            Ok(true)
        })
        .with_timeout(Duration::from_secs(1))
        .with_interval(Duration::from_millis(100));

        let start = Instant::now();
        let err = wait_for(&condition, &CancellationToken::new()).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(2));
        match err {
            E2eError::Timeout(e) => assert!(e.last_state.contains("still running")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_running_predicate() {
        let condition = Condition::new("hung predicate", || async {
            tokio::time::sleep(Duration::from_secs(6)).await;
            Ok(true)
        })
        .with_timeout(Duration::from_secs(1))
        .with_interval(Duration::from_millis(100));
        let token = Arc::new(CancellationToken::new());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel("operator interrupt");
        });

        let start = Instant::now();
        let err = wait_for(&condition, &token).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(900));
        assert_eq!(err.kind(), "cancelled");
    }

    #[tokio::test]
    async fn test_already_cancelled_never_evaluates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let condition = Condition::new("unused", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(true) }
        })
        .with_timeout(Duration::from_secs(5))
        .with_interval(Duration::from_secs(1));
        let token = CancellationToken::new();
        token.cancel("shutdown");

        assert!(wait_for(&condition, &token).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_condition_rejected_before_polling() {
        let condition = Condition::new("bad", || async { Ok(true) })
            .with_timeout(Duration::from_secs(1))
            .with_interval(Duration::from_secs(2));
        let err = wait_for(&condition, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
