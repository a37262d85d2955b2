use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation flag shared between a query session and its in-flight queries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Drives `future` to completion unless `token` fires first.
pub async fn until_cancelled<F: Future>(token: Option<&CancelToken>, future: F) -> Option<F::Output> {
    match token {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                output = future => Some(output),
            }
        }
        None => Some(future.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let output = until_cancelled(Some(&token), tokio::time::sleep(Duration::from_secs(5))).await;
        assert!(output.is_none());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_uncancelled_future_completes() {
        let token = CancelToken::new();
        let output = tokio_test::block_on(until_cancelled(Some(&token), async { 7 }));
        assert_eq!(output, Some(7));
        assert_eq!(tokio_test::block_on(until_cancelled(None, async { 8 })), Some(8));
    }

    #[test]
    fn test_already_cancelled_token_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        tokio_test::block_on(token.cancelled());
    }
}
