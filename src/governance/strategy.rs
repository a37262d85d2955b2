//! Ordered fallback evaluation.
//!
//! Every query in this crate has one authoritative way to get an answer and
//! a few cheaper or less precise ones. A [`FallbackChain`] lists them in
//! preference order; each strategy is only started once every earlier one
//! has failed.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::{FutureExt, LocalBoxFuture};
use log::{debug, warn};
use thiserror::Error;
use tokio::time::timeout;

use super::cancel::{until_cancelled, CancelToken};
use crate::error::{GatewayError, GovernanceError};

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("not applicable: {0}")]
    NotApplicable(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

pub type StrategyResult<T> = Result<T, StrategyError>;

type StrategyStart<'a, T> = Box<dyn FnOnce() -> LocalBoxFuture<'a, StrategyResult<T>> + 'a>;

struct Step<'a, T> {
    name: &'static str,
    limit: Option<Duration>,
    start: StrategyStart<'a, T>,
}

/// Successful outcome of a chain run.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    /// Name of the strategy that produced `value`.
    pub strategy: &'static str,
    /// `"name: error"` for every strategy tried before it.
    pub failures: Vec<String>,
    pub elapsed: Duration,
}

pub struct FallbackChain<'a, T> {
    label: &'static str,
    steps: Vec<Step<'a, T>>,
}

impl<'a, T: 'a> FallbackChain<'a, T> {
    pub fn new(label: &'static str) -> Self {
        Self { label, steps: Vec::new() }
    }

    pub fn then<F, Fut>(self, name: &'static str, strategy: F) -> Self
    where
        F: FnOnce() -> Fut + 'a,
        Fut: Future<Output = StrategyResult<T>> + 'a,
    {
        self.push(name, None, strategy)
    }

    /// Like [`FallbackChain::then`], but the strategy is abandoned after `limit`.
    pub fn then_within<F, Fut>(self, name: &'static str, limit: Duration, strategy: F) -> Self
    where
        F: FnOnce() -> Fut + 'a,
        Fut: Future<Output = StrategyResult<T>> + 'a,
    {
        self.push(name, Some(limit), strategy)
    }

    fn push<F, Fut>(mut self, name: &'static str, limit: Option<Duration>, strategy: F) -> Self
    where
        F: FnOnce() -> Fut + 'a,
        Fut: Future<Output = StrategyResult<T>> + 'a,
    {
        self.steps.push(Step {
            name,
            limit,
            start: Box::new(move || strategy().boxed_local()),
        });
        self
    }

    pub async fn run(self, cancel: Option<&CancelToken>) -> Result<Resolved<T>, GovernanceError> {
        let started = Instant::now();
        let mut failures = Vec::new();

        for step in self.steps {
            if cancel.map_or(false, CancelToken::is_cancelled) {
                return Err(GovernanceError::Cancelled);
            }

            let attempt = (step.start)();
            let bounded = async {
                match step.limit {
                    Some(limit) => timeout(limit, attempt).await.unwrap_or(Err(StrategyError::TimedOut(limit))),
                    None => attempt.await,
                }
            };

            match until_cancelled(cancel, bounded).await {
                None => return Err(GovernanceError::Cancelled),
                Some(Ok(value)) => {
                    debug!("{}: resolved by {} after {} failure(s)", self.label, step.name, failures.len());
                    return Ok(Resolved {
                        value,
                        strategy: step.name,
                        failures,
                        elapsed: started.elapsed(),
                    });
                }
                Some(Err(e)) => {
                    warn!("{}: strategy {} failed: {}", self.label, step.name, e);
                    failures.push(format!("{}: {}", step.name, e));
                }
            }
        }

        Err(GovernanceError::Exhausted { label: self.label, failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_first_success_wins_and_later_strategies_never_start() {
        let started = Cell::new(0);
        let resolved = FallbackChain::new("test")
            .then("broken", || async { Err(StrategyError::NotApplicable("nope".into())) })
            .then("works", || async { Ok(2) })
            .then("unused", || {
                started.set(started.get() + 1);
                async { Ok(3) }
            })
            .run(None)
            .await
            .unwrap();

        assert_eq!(resolved.value, 2);
        assert_eq!(resolved.strategy, "works");
        assert_eq!(resolved.failures, vec!["broken: not applicable: nope".to_string()]);
        assert_eq!(started.get(), 0);
    }

    #[tokio::test]
    async fn test_all_failures_are_reported() {
        let result: Result<Resolved<u8>, _> = FallbackChain::new("totals")
            .then("a", || async { Err(StrategyError::Gateway(GatewayError::Rpc("down".into()))) })
            .then("b", || async { Err(StrategyError::NotApplicable("empty".into())) })
            .run(None)
            .await;

        match result {
            Err(GovernanceError::Exhausted { label, failures }) => {
                assert_eq!(label, "totals");
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.value)),
        }
    }

    #[tokio::test]
    async fn test_slow_strategy_falls_through_on_timeout() {
        let resolved = FallbackChain::new("slow")
            .then_within("sleepy", Duration::from_millis(20), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("late")
            })
            .then("quick", || async { Ok("fallback") })
            .run(None)
            .await
            .unwrap();

        assert_eq!(resolved.value, "fallback");
        assert!(resolved.failures[0].starts_with("sleepy: timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_the_chain() {
        let token = CancelToken::new();
        token.cancel();
        let result = FallbackChain::new("cancelled")
            .then("never", || async { Ok(1) })
            .run(Some(&token))
            .await;
        assert!(matches!(result, Err(GovernanceError::Cancelled)));
    }
}
