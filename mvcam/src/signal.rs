//! # Cross-thread event primitives

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock(flag: &Mutex<bool>) -> MutexGuard<bool> {
    flag.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sticky motion trigger.
///
/// Set and cleared by the motion analyzer only. Any number of threads may check it or block on
/// it until it gets set.
#[derive(Default, Debug)]
pub struct TriggerSignal {
    flag: Mutex<bool>,
    cvar: Condvar,
}

impl TriggerSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        *lock(&self.flag)
    }

    pub(crate) fn set(&self) {
        let mut flag = lock(&self.flag);
        if !*flag {
            *flag = true;
            self.cvar.notify_all();
        }
    }

    pub(crate) fn clear(&self) {
        *lock(&self.flag) = false;
    }

    /// Block until the trigger is set, or `timeout` elapses.
    ///
    /// Returns the state of the trigger at wake up.
    pub fn wait(&self, timeout: Duration) -> bool {
        let flag = lock(&self.flag);
        let (flag, _) = self
            .cvar
            .wait_timeout_while(flag, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        *flag
    }
}

/// Capturing state of the camera.
///
/// Every background loop runs while the camera is capturing, and sleeps through
/// [`wait`](Self::wait), which returns as soon as capture stops.
#[derive(Debug)]
pub struct CaptureState {
    capturing: Mutex<bool>,
    cvar: Condvar,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureState {
    /// Create a new state, in capturing mode.
    pub fn new() -> Self {
        Self {
            capturing: Mutex::new(true),
            cvar: Condvar::new(),
        }
    }

    pub fn is_capturing(&self) -> bool {
        *lock(&self.capturing)
    }

    /// Stop capturing and wake every waiter.
    ///
    /// Returns `true` only on the call that actually stopped the capture.
    pub fn stop(&self) -> bool {
        let mut capturing = lock(&self.capturing);
        let was_capturing = std::mem::replace(&mut *capturing, false);
        self.cvar.notify_all();
        was_capturing
    }

    /// Sleep for `timeout`, or until capture stops.
    pub fn wait(&self, timeout: Duration) {
        let capturing = lock(&self.capturing);
        let _ = self
            .cvar
            .wait_timeout_while(capturing, timeout, |capturing| *capturing)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn trigger_wait_times_out() {
        let trigger = TriggerSignal::new();
        let start = Instant::now();
        assert!(!trigger.wait(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn trigger_wait_returns_when_set() {
        let trigger = Arc::new(TriggerSignal::new());

        let setter = {
            let trigger = trigger.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                trigger.set();
            })
        };

        let start = Instant::now();
        assert!(trigger.wait(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        setter.join().unwrap();

        // Already set trigger does not block.
        assert!(trigger.wait(Duration::from_secs(10)));

        trigger.clear();
        assert!(!trigger.is_set());
    }

    #[test]
    fn stop_wakes_waiters() {
        let state = Arc::new(CaptureState::new());

        let waiter = {
            let state = state.clone();
            std::thread::spawn(move || {
                let start = Instant::now();
                state.wait(Duration::from_secs(30));
                start.elapsed()
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(state.stop());
        assert!(!state.stop());

        assert!(waiter.join().unwrap() < Duration::from_secs(5));
        assert!(!state.is_capturing());

        // Stopped state never blocks.
        let start = Instant::now();
        state.wait(Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
