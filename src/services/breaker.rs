//! Circuit breaker guarding calls to a downstream dependency.
//!
//! # States
//! - Closed: calls pass through, outcomes go into a count-based rolling window
//! - Open: calls are rejected without being attempted
//! - Half-Open: a limited number of trial calls probe for recovery
//!
//! # Transitions
//! ```text
//! Closed    -> Open:      failure rate >= threshold (once `minimum_calls` outcomes are in the window)
//! Open      -> Half-Open: cool-down elapsed (checked lazily on the next call)
//! Half-Open -> Closed:    all permitted trials finished below the threshold
//! Half-Open -> Open:      trials finished at/above the threshold (cool-down restarts)
//! ```
//!
//! Each breaker owns its state behind a single mutex; breakers never share counters.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::BreakerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Failure handed to the fallback of [`CircuitBreaker::run`].
#[derive(Debug)]
pub enum CallError<E> {
    /// The breaker is open; the call was never attempted.
    NotPermitted { breaker: String },
    /// The call ran and failed.
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPermitted { breaker } => {
                write!(f, "call not permitted: circuit breaker '{}' is open", breaker)
            }
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Point-in-time view of a breaker, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failed_calls: usize,
    pub successful_calls: usize,
    pub not_permitted_calls: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    // true = failure
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    trials_issued: usize,
    trial_failures: usize,
    trial_successes: usize,
    not_permitted: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            window: VecDeque::new(),
            opened_at: None,
            trials_issued: 0,
            trial_failures: 0,
            trial_successes: 0,
            not_permitted: 0,
        }
    }

    fn reset_trials(&mut self) {
        self.trials_issued = 0;
        self.trial_failures = 0;
        self.trial_successes = 0;
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let failed_calls = inner.window.iter().filter(|failed| **failed).count();
        BreakerSnapshot {
            state: inner.state,
            failed_calls,
            successful_calls: inner.window.len() - failed_calls,
            not_permitted_calls: inner.not_permitted,
        }
    }

    /// Run `primary` under the breaker; any failure (including rejection) goes to `fallback`.
    pub async fn run<T, E, F, Fut, FB>(&self, primary: F, fallback: FB) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(CallError<E>) -> T,
    {
        match self.call(primary).await {
            Ok(value) => value,
            Err(err) => fallback(err),
        }
    }

    /// Like [`run`](Self::run), returning the failure instead of handing it to a fallback.
    pub async fn call<T, E, F, Fut>(&self, primary: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire().ok_or_else(|| CallError::NotPermitted {
            breaker: self.name.clone(),
        })?;

        let result = primary().await;
        permit.record(result.is_ok());
        result.map_err(CallError::Failed)
    }

    fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.inner.lock();

        if inner.state == BreakerState::Open {
            let cooled_down = inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.settings.open_cooldown);
            if !cooled_down {
                inner.not_permitted += 1;
                return None;
            }
            inner.state = BreakerState::HalfOpen;
            inner.reset_trials();
            tracing::info!(breaker = %self.name, "circuit breaker half-open");
        }

        match inner.state {
            BreakerState::Closed => Some(CallPermit::new(self, false)),
            BreakerState::HalfOpen
                if inner.trials_issued < self.settings.permitted_half_open_calls =>
            {
                inner.trials_issued += 1;
                Some(CallPermit::new(self, true))
            }
            _ => {
                inner.not_permitted += 1;
                None
            }
        }
    }

    fn on_outcome(&self, trial: bool, success: bool) {
        let mut inner = self.inner.lock();

        match (inner.state, trial) {
            (BreakerState::Closed, false) => {
                inner.window.push_back(!success);
                while inner.window.len() > self.settings.sliding_window_size {
                    inner.window.pop_front();
                }
                if inner.window.len() >= self.settings.minimum_calls {
                    let failures = inner.window.iter().filter(|failed| **failed).count();
                    if self.exceeds_threshold(failures, inner.window.len()) {
                        self.transition_to_open(&mut inner, failures);
                    }
                }
            }
            (BreakerState::HalfOpen, true) => {
                if success {
                    inner.trial_successes += 1;
                } else {
                    inner.trial_failures += 1;
                }
                let finished = inner.trial_successes + inner.trial_failures;
                if finished >= self.settings.permitted_half_open_calls {
                    let failures = inner.trial_failures;
                    if self.exceeds_threshold(failures, finished) {
                        self.transition_to_open(&mut inner, failures);
                    } else {
                        inner.state = BreakerState::Closed;
                        inner.window.clear();
                        inner.opened_at = None;
                        inner.reset_trials();
                        tracing::info!(breaker = %self.name, "circuit breaker closed");
                    }
                }
            }
            // Stale outcome from a call admitted before the last transition.
            _ => {}
        }
    }

    fn release_trial(&self) {
        let mut inner = self.inner.lock();
        let finished = inner.trial_successes + inner.trial_failures;
        if inner.state == BreakerState::HalfOpen && inner.trials_issued > finished {
            inner.trials_issued -= 1;
        }
    }

    fn exceeds_threshold(&self, failures: usize, total: usize) -> bool {
        total > 0 && failures * 100 >= usize::from(self.settings.failure_rate_threshold) * total
    }

    fn transition_to_open(&self, inner: &mut Inner, failures: usize) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.reset_trials();
        tracing::warn!(
            breaker = %self.name,
            failures,
            cooldown_secs = self.settings.open_cooldown.as_secs(),
            "circuit breaker opened"
        );
    }
}

/// Admission ticket for one call. A trial permit dropped without an outcome is handed back.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    recorded: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            recorded: false,
        }
    }

    fn record(mut self, success: bool) {
        self.recorded = true;
        self.breaker.on_outcome(self.trial, success);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.recorded {
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn settings(window: usize) -> BreakerSettings {
        BreakerSettings {
            failure_rate_threshold: 50,
            sliding_window_size: window,
            minimum_calls: window,
            open_cooldown: Duration::from_secs(30),
            permitted_half_open_calls: 1,
        }
    }

    async fn fail(breaker: &CircuitBreaker, invocations: &AtomicUsize) -> Result<(), String> {
        breaker
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom".to_string())
            })
            .await
            .map_err(|e| e.to_string())
    }

    async fn succeed(breaker: &CircuitBreaker, invocations: &AtomicUsize) -> Result<(), String> {
        breaker
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            })
            .await
            .map_err(|e| e.to_string())
    }

    #[tokio::test]
    async fn opens_after_threshold_and_stops_invoking() {
        let breaker = CircuitBreaker::new("users", settings(4));
        let invocations = AtomicUsize::new(0);

        for _ in 0..4 {
            let _ = fail(&breaker, &invocations).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        for _ in 0..3 {
            let err = fail(&breaker, &invocations).await.unwrap_err();
            assert!(err.contains("not permitted"));
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 4);
        assert_eq!(breaker.snapshot().not_permitted_calls, 3);
    }

    #[tokio::test]
    async fn stays_closed_below_minimum_calls() {
        let breaker = CircuitBreaker::new("users", settings(4));
        let invocations = AtomicUsize::new(0);

        for _ in 0..3 {
            let _ = fail(&breaker, &invocations).await;
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().failed_calls, 3);
    }

    #[tokio::test]
    async fn stays_closed_when_failure_rate_is_low() {
        let breaker = CircuitBreaker::new("users", settings(4));
        let invocations = AtomicUsize::new(0);

        let _ = fail(&breaker, &invocations).await;
        for _ in 0..3 {
            succeed(&breaker, &invocations).await.unwrap();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_allows_one_trial_and_closes_on_success() {
        let breaker = CircuitBreaker::new("users", settings(2));
        let invocations = AtomicUsize::new(0);
        let _ = fail(&breaker, &invocations).await;
        let _ = fail(&breaker, &invocations).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        // While the trial is in flight, a second caller is rejected.
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let trial = breaker.call(move || async move {
            rx.await.ok();
            Ok::<(), String>(())
        });
        tokio::pin!(trial);
        assert!(futures_poll_once(trial.as_mut()).await.is_none());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(fail(&breaker, &invocations).await.is_err());
        assert_eq!(invocations.load(Ordering::SeqCst), 2);

        tx.send(()).unwrap();
        trial.await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().failed_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_and_restarts_cooldown() {
        let breaker = CircuitBreaker::new("users", settings(2));
        let invocations = AtomicUsize::new(0);
        let _ = fail(&breaker, &invocations).await;
        let _ = fail(&breaker, &invocations).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        let _ = fail(&breaker, &invocations).await;
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(invocations.load(Ordering::SeqCst), 3);

        // The cool-down counts from the failed trial, not from the first opening.
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(succeed(&breaker, &invocations).await.is_err());
        assert_eq!(invocations.load(Ordering::SeqCst), 3);

        tokio::time::advance(Duration::from_secs(11)).await;
        succeed(&breaker, &invocations).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_returns_its_permit() {
        let breaker = CircuitBreaker::new("users", settings(1));
        let invocations = AtomicUsize::new(0);
        let _ = fail(&breaker, &invocations).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        {
            let trial = breaker.call(|| std::future::pending::<Result<(), String>>());
            tokio::pin!(trial);
            assert!(futures_poll_once(trial.as_mut()).await.is_none());
        }

        succeed(&breaker, &invocations).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn breakers_are_independent() {
        let a = CircuitBreaker::new("a", settings(1));
        let b = CircuitBreaker::new("b", settings(1));
        let invocations = AtomicUsize::new(0);

        let _ = fail(&a, &invocations).await;
        assert_eq!(a.state(), BreakerState::Open);
        assert_eq!(b.state(), BreakerState::Closed);
        succeed(&b, &invocations).await.unwrap();
    }

    #[tokio::test]
    async fn run_hands_failures_to_the_fallback() {
        let breaker = CircuitBreaker::new("users", settings(1));

        let out = breaker
            .run(
                || async { Err::<&str, _>("down") },
                |err| match err {
                    CallError::Failed(e) => e,
                    CallError::NotPermitted { .. } => "rejected",
                },
            )
            .await;
        assert_eq!(out, "down");

        let out = breaker
            .run(
                || async { Ok::<_, &str>("unreachable") },
                |err| match err {
                    CallError::Failed(e) => e,
                    CallError::NotPermitted { .. } => "rejected",
                },
            )
            .await;
        assert_eq!(out, "rejected");
    }

    #[tokio::test]
    async fn concurrent_failures_open_exactly_once() {
        let breaker = Arc::new(CircuitBreaker::new("users", settings(8)));
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let breaker = breaker.clone();
            let invocations = invocations.clone();
            handles.push(tokio::spawn(async move {
                let _ = fail(&breaker, &invocations).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(invocations.load(Ordering::SeqCst), 8);
    }

    // Poll a future once; `None` means it is still pending.
    async fn futures_poll_once<F: Future + Unpin>(fut: F) -> Option<F::Output> {
        let mut fut = fut;
        std::future::poll_fn(|cx| {
            std::task::Poll::Ready(match std::pin::Pin::new(&mut fut).poll(cx) {
                std::task::Poll::Ready(v) => Some(v),
                std::task::Poll::Pending => None,
            })
        })
        .await
    }
}
