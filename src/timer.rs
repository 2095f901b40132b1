//! One-shot delayed callbacks
//!
//! Timers run on their own tasks, independent of any turn. A fired timer's
//! callback is expected to talk to the orchestrator through its command
//! surface (typically by starting an announcement turn), never by touching
//! session state directly.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::{Error, Result};

type Pending = Arc<Mutex<HashMap<u64, CancellationToken>>>;

/// Identifies a scheduled timer
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    fire_at: Instant,
}

impl TimerHandle {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// When the timer is due
    #[must_use]
    pub const fn fire_at(&self) -> Instant {
        self.fire_at
    }
}

/// Schedules cancellable one-shot callbacks
#[derive(Debug)]
pub struct TimerService {
    root: CancellationToken,
    next_id: AtomicU64,
    pending: Pending,
    tracker: TaskTracker,
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            tracker: TaskTracker::new(),
        }
    }

    /// Run `callback` once after `after` has elapsed
    ///
    /// # Errors
    ///
    /// Returns `Error::Timer` if the deadline is not representable
    pub fn schedule<F>(&self, after: Duration, callback: F) -> Result<TimerHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let fire_at = Instant::now()
            .checked_add(after)
            .ok_or_else(|| Error::Timer(format!("delay of {}s is out of range", after.as_secs())))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();

        lock(&self.pending).insert(id, token.clone());

        let pending = Arc::clone(&self.pending);
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::debug!(timer = id, "timer cancelled before firing");
                }
                () = tokio::time::sleep_until(fire_at) => {
                    // Whoever removes the entry owns the timer: cancel() or us
                    let claimed = lock(&pending).remove(&id).is_some();
                    if claimed {
                        tracing::debug!(timer = id, "timer fired");
                        tokio::select! {
                            () = token.cancelled() => {
                                tracing::debug!(timer = id, "timer callback aborted by shutdown");
                            }
                            () = callback => {}
                        }
                    }
                }
            }
        });

        tracing::debug!(timer = id, after_ms = after.as_millis(), "timer scheduled");
        Ok(TimerHandle { id, fire_at })
    }

    /// Cancel a timer
    ///
    /// Returns `true` if the timer was still pending. Cancelling a timer that
    /// already fired (or was already cancelled) is a no-op.
    pub fn cancel(&self, handle: &TimerHandle) -> bool {
        let removed = lock(&self.pending).remove(&handle.id);
        removed.is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Whether the timer has neither fired nor been cancelled
    #[must_use]
    pub fn is_pending(&self, handle: &TimerHandle) -> bool {
        lock(&self.pending).contains_key(&handle.id)
    }

    /// Number of timers waiting to fire
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Cancel every timer and wait for their tasks to finish
    pub async fn shutdown(&self) {
        self.root.cancel();
        lock(&self.pending).clear();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!("timer service stopped");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let make = move || {
            let c = Arc::clone(&c);
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let timers = TimerService::new();
        let (count, make) = counter();

        let handle = timers.schedule(Duration::from_secs(5), make()).unwrap();
        assert!(timers.is_pending(&handle));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending(&handle));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timers = TimerService::new();
        let (count, make) = counter();

        let handle = timers.schedule(Duration::from_secs(3), make()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(timers.cancel(&handle));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(timers.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_safe_after_firing() {
        let timers = TimerService::new();
        let (count, make) = counter();

        let fired = timers.schedule(Duration::from_millis(10), make()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timers.cancel(&fired));

        let pending = timers.schedule(Duration::from_secs(1), make()).unwrap();
        assert!(timers.cancel(&pending));
        assert!(!timers.cancel(&pending));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything() {
        let timers = TimerService::new();
        let (count, make) = counter();

        timers.schedule(Duration::from_secs(1), make()).unwrap();
        timers.schedule(Duration::from_secs(2), make()).unwrap();
        timers.shutdown().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn out_of_range_delay_is_rejected() {
        let timers = TimerService::new();

        let result = timers.schedule(Duration::from_secs(u64::MAX), async {});
        assert!(matches!(result, Err(Error::Timer(_))));
        assert_eq!(timers.pending_count(), 0);
    }
}
