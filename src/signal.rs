//! Cross-domain notification seam.
//!
//! The channel core only moves bytes through shared memory. Telling the
//! other side to look is the job of these two primitives:
//!
//! - [`Readiness`]: the unprivileged side waits (optionally bounded) until
//!   its inbound ring has data, or asks without waiting.
//! - [`Doorbell`]: the unprivileged side pokes the privileged side after
//!   filling the return ring. The poke carries no payload.
//!
//! [`WaitQueue`] is the in-process wake primitive the privileged side
//! uses to implement [`Readiness`]. [`StopSignal`] builds on it so paced
//! loops sleep until their next round or a stop request, whichever comes
//! first.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Blocking and non-blocking readability queries on the inbound ring.
pub trait Readiness {
    /// Non-blocking: is at least one byte pending?
    fn is_readable(&self) -> bool;

    /// Blocks until the ring is readable or `timeout` elapses.
    ///
    /// `None` waits indefinitely. Returns `true` if the ring was readable
    /// when the call returned.
    fn wait_readable(&self, timeout: Option<Duration>) -> bool;

    /// `true` once the other side is gone and nothing will become readable.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Zero-payload "please drain the return ring" notification.
pub trait Doorbell {
    fn ring(&self);
}

impl<T: Readiness + ?Sized> Readiness for &T {
    fn is_readable(&self) -> bool {
        (**self).is_readable()
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> bool {
        (**self).wait_readable(timeout)
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

impl<T: Doorbell + ?Sized> Doorbell for &T {
    fn ring(&self) {
        (**self).ring()
    }
}

/// Condition-variable wait queue.
///
/// Wakers must publish the state change first and call
/// [`wake_all`](Self::wake_all) afterwards. Waiters re-check their
/// condition under the queue's lock, so a wake issued between the check
/// and the sleep is never lost.
#[derive(Debug, Default)]
pub struct WaitQueue {
    lock: Mutex<()>,
    cond: Condvar,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake_all(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    /// Waits until `condition` holds or `timeout` elapses.
    ///
    /// Returns the final value of `condition`.
    pub fn wait_until<F>(&self, mut condition: F, timeout: Option<Duration>) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock.lock();
        loop {
            if condition() {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut guard, deadline).timed_out() {
                        return condition();
                    }
                }
                None => self.cond.wait(&mut guard),
            }
        }
    }
}

/// Sticky stop request shared by the threads of one run.
#[derive(Debug, Default)]
pub struct StopSignal {
    requested: AtomicBool,
    queue: WaitQueue,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every [`sleep`](Self::sleep)er.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        self.queue.wake_all();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Sleeps for `timeout` unless a stop is requested first.
    ///
    /// Returns `true` if the stop was requested.
    pub fn sleep(&self, timeout: Duration) -> bool {
        self.queue.wait_until(|| self.is_requested(), Some(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_times_out_when_condition_never_holds() {
        let queue = WaitQueue::new();
        let start = Instant::now();
        assert!(!queue.wait_until(|| false, Some(Duration::from_millis(20))));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_returns_immediately_when_condition_holds() {
        let queue = WaitQueue::new();
        assert!(queue.wait_until(|| true, None));
    }

    #[test]
    fn wake_releases_a_blocked_waiter() {
        let queue = Arc::new(WaitQueue::new());
        let flag = Arc::new(AtomicBool::new(false));

        let waiter = {
            let queue = queue.clone();
            let flag = flag.clone();
            thread::spawn(move || queue.wait_until(|| flag.load(Ordering::Acquire), None))
        };

        thread::sleep(Duration::from_millis(10));
        flag.store(true, Ordering::Release);
        queue.wake_all();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn stop_request_cuts_a_long_sleep_short() {
        let stop = Arc::new(StopSignal::new());
        let sleeper = {
            let stop = stop.clone();
            thread::spawn(move || {
                let start = Instant::now();
                (stop.sleep(Duration::from_secs(30)), start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(10));
        stop.request();

        let (stopped, slept) = sleeper.join().unwrap();
        assert!(stopped);
        assert!(slept < Duration::from_secs(5));
        assert!(stop.sleep(Duration::from_secs(30)), "the request is sticky");
    }

    #[test]
    fn sleep_runs_out_without_a_request() {
        let stop = StopSignal::new();
        assert!(!stop.sleep(Duration::from_millis(5)));
        assert!(!stop.is_requested());
    }
}
