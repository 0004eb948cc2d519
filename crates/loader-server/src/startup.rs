//! Startup readiness gate
//!
//! The service accepts no work until its collaborators are reachable, in
//! strict order: persistence first (Fibonacci backoff with a hard attempt
//! cap; exhaustion is fatal), then the container runtime (degraded-tolerant,
//! see [`crate::extract::ExtractionOrchestrator::prepare`]).
//!
//! The gate runs once at process start. A mid-life persistence outage is
//! reported per request by the store, not by re-entering the gate.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;

/// Bounded backoff schedule: Fibonacci multiples of an initial delay,
/// capped per-delay and by a hard attempt count.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// The delays slept between attempts: `initial * fib(n)`, capped at
    /// `max_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        fibonacci_delays(self.initial_delay, self.max_delay)
    }
}

/// Infinite Fibonacci-scaled delay sequence (1, 1, 2, 3, 5, ... times
/// `initial`), capped at `max`.
pub fn fibonacci_delays(initial: Duration, max: Duration) -> impl Iterator<Item = Duration> {
    let mut current: u32 = 1;
    let mut next: u32 = 1;
    std::iter::from_fn(move || {
        let factor = current;
        let sum = current.saturating_add(next);
        current = next;
        next = sum;
        Some(initial.saturating_mul(factor).min(max))
    })
}

/// A readiness step exhausted its attempt cap.
#[derive(Debug, Error)]
#[error("{label} not ready after {attempts} attempts: {last_error}")]
pub struct GateError {
    pub label: &'static str,
    pub attempts: u32,
    pub last_error: String,
}

/// Run a fallible step under a backoff policy, returning the first success
/// or a [`GateError`] once the attempt cap is exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &'static str,
    policy: &BackoffPolicy,
    mut op: F,
) -> Result<T, GateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delays = policy.delays();
    let mut last_error = String::from("no attempt was made");

    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "{} ready", label);
                }
                return Ok(value);
            },
            Err(e) => {
                last_error = e.to_string();
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %last_error,
                    "{} not ready",
                    label
                );
            },
        }

        if attempt < policy.max_attempts {
            let delay = delays.next().unwrap_or(policy.max_delay);
            debug!(delay_ms = delay.as_millis() as u64, "backing off");
            tokio::time::sleep(delay).await;
        }
    }

    Err(GateError {
        label,
        attempts: policy.max_attempts,
        last_error,
    })
}

/// Establish the persistence connection, retrying under the configured
/// backoff policy. Exhausting the cap is fatal for the process.
pub async fn connect_database(config: &DatabaseConfig) -> Result<PgPool, GateError> {
    let policy = BackoffPolicy {
        initial_delay: Duration::from_millis(config.startup_initial_delay_ms),
        max_delay: Duration::from_millis(config.startup_max_delay_ms),
        max_attempts: config.startup_attempts,
    };

    let url = config.url.clone();
    let max_connections = config.max_connections;
    let min_connections = config.min_connections;
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    retry_with_backoff("database", &policy, move || {
        let url = url.clone();
        async move {
            PgPoolOptions::new()
                .max_connections(max_connections)
                .min_connections(min_connections)
                .acquire_timeout(connect_timeout)
                .connect(&url)
                .await
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fibonacci_progression() {
        let delays: Vec<u64> = fibonacci_delays(Duration::from_millis(100), Duration::from_secs(60))
            .take(6)
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 100, 200, 300, 500, 800]);
    }

    #[test]
    fn test_fibonacci_capped_at_max_delay() {
        let delays: Vec<u64> = fibonacci_delays(Duration::from_secs(1), Duration::from_secs(3))
            .take(6)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 1, 2, 3, 3, 3]);
    }

    fn policy(attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            max_attempts: attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = retry_with_backoff("fake-step", &policy(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("still starting")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_attempt_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<u32, GateError> =
            retry_with_backoff("fake-step", &policy(4), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>("connection refused")
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_immediately_on_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = retry_with_backoff("fake-step", &policy(3), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>("up")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "up");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
