use crate::state::deadline_after;
use crate::sync::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};

/// A counting semaphore.
///
/// Waiters block on a condition variable and re-check the permit count after
/// every wake-up, so spurious wake-ups never hand out a permit that is not there.
///
/// Initialised with zero permits it behaves as a closed signal; one `release`
/// opens it for exactly one `acquire`.
///
/// ```
/// use cohort_sync::Semaphore;
///
/// let signal = Semaphore::new(0);
/// assert!(!signal.try_acquire());
/// signal.release();
/// assert!(signal.try_acquire());
/// ```
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `permits` permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Take one permit, blocking until one is available.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            permits = self.available.wait(permits);
        }
        *permits -= 1;
    }

    /// Take one permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Take one permit, giving up once `timeout` has elapsed.
    ///
    /// Returns `false` if no permit could be taken in time; the semaphore is
    /// left untouched in that case. A timeout too large to form a deadline
    /// waits like [`acquire`](Self::acquire).
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = deadline_after(timeout) else {
            self.acquire();
            return true;
        };
        let mut permits = self.permits.lock();
        while *permits == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self.available.wait_timeout(permits, deadline - now);
            permits = guard;
            if result.timed_out() && *permits == 0 {
                return false;
            }
        }
        *permits -= 1;
        true
    }

    /// Return one permit and wake a single waiter.
    ///
    /// # Panics
    ///
    /// Panics if the permit count would overflow, which only happens when
    /// permits are released that were never acquired.
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        *permits = permits
            .checked_add(1)
            .unwrap_or_else(|| panic!("BUG: semaphore permit count overflowed"));
        drop(permits);
        self.available.notify_one();
    }

    /// Number of permits currently available.
    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("permits", &self.available_permits())
            .finish()
    }
}
