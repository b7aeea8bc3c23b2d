//! Cooperative shutdown signal shared by every service loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Cloneable stop flag with an interruptible wait.
///
/// Loops never `thread::sleep` between iterations; they park on the token so
/// that a trigger wakes every pacing and backoff wait immediately instead of
/// after the wait runs out.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    triggered: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the flag and wake every parked waiter.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.cv.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Park for up to `timeout`, returning `true` when shutdown fired.
    ///
    /// Returns immediately when the token was already triggered, so callers
    /// can use it as the loop condition: `while !token.wait(pause) { .. }`.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        if !timeout.is_zero() {
            let guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
            // Recheck under the lock: a trigger between the first check and
            // here would otherwise park us past its notify.
            if !self.is_triggered() {
                let _unused = self
                    .inner
                    .cv
                    .wait_timeout(guard, timeout)
                    .unwrap_or_else(|e| e.into_inner());
            }
        }
        self.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wait_runs_out_when_not_triggered() {
        let token = ShutdownToken::new();
        let start = Instant::now();
        assert!(!token.wait(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn trigger_wakes_a_parked_waiter_early() {
        let token = ShutdownToken::new();
        let waiter = token.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || waiter.wait(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        token.trigger();
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn triggered_token_returns_without_parking() {
        let token = ShutdownToken::new();
        token.trigger();
        let start = Instant::now();
        assert!(token.wait(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
