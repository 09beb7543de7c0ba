//! Trailing-edge debounce over a single pending task.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Action<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

struct Pending {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs `action` with the most recent value once `quiet` has passed without
/// a new one.
///
/// At most one task is pending. Scheduling cancels and replaces it, so a
/// burst of values produces a single call with the last value. Cancelling
/// (explicitly or by dropping) discards the pending value without running
/// the action. An action that has already started runs to completion.
///
/// Must be used from within a tokio runtime.
pub struct Debouncer<T> {
    quiet: Duration,
    action: Action<T>,
    slot: Mutex<Option<Pending>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(quiet: Duration, action: F) -> Self
    where
        F: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            quiet,
            action: Arc::new(action),
            slot: Mutex::new(None),
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    fn slot(&self) -> MutexGuard<'_, Option<Pending>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn schedule(&self, value: T) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let action = Arc::clone(&self.action);
        let quiet = self.quiet;

        let mut slot = self.slot();
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
        }

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(quiet) => action(value).await,
            }
        });
        *slot = Some(Pending { cancel, handle });
    }

    /// Drop the pending value, if any. Nothing is flushed.
    pub fn cancel(&self) {
        if let Some(pending) = self.slot().take() {
            pending.cancel.cancel();
        }
    }

    /// A value is waiting for its quiet period or its action is running.
    pub fn is_pending(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|p| !p.cancel.is_cancelled() && !p.handle.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = slot.take() {
            pending.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn recording(quiet: Duration) -> (Debouncer<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let debouncer = Debouncer::new(quiet, move |v: u32| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().unwrap().push(v) }.boxed()
        });
        (debouncer, seen)
    }

    const QUIET: Duration = Duration::from_millis(1000);

    #[tokio::test(start_paused = true)]
    async fn test_burst_sends_last_value_once() {
        let (debouncer, seen) = recording(QUIET);
        for v in 1..=5 {
            debouncer.schedule(v);
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(QUIET).await;
        assert_eq!(*seen.lock().unwrap(), vec![5]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_fires_before_quiet_period() {
        let (debouncer, seen) = recording(QUIET);
        debouncer.schedule(1);
        tokio::time::sleep(QUIET - Duration::from_millis(1)).await;
        assert!(seen.lock().unwrap().is_empty());
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_bursts_send_twice() {
        let (debouncer, seen) = recording(QUIET);
        debouncer.schedule(1);
        debouncer.schedule(2);
        tokio::time::sleep(QUIET * 2).await;
        debouncer.schedule(3);
        debouncer.schedule(4);
        tokio::time::sleep(QUIET * 2).await;
        assert_eq!(*seen.lock().unwrap(), vec![2, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_does_not_flush() {
        let (debouncer, seen) = recording(QUIET);
        debouncer.schedule(1);
        debouncer.cancel();
        assert!(!debouncer.is_pending());
        tokio::time::sleep(QUIET * 3).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_does_not_flush() {
        let (debouncer, seen) = recording(QUIET);
        debouncer.schedule(1);
        drop(debouncer);
        tokio::time::sleep(QUIET * 3).await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
