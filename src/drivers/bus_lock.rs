//! Bounded-wait lock around the shared I/O expander.
//!
//! The expander is touched by the control loop, the loader task and the
//! display task. Every register transaction takes the lock for its own
//! duration only; a caller that cannot get it within the timeout gets
//! [`BusError::LockTimeout`] and skips the operation for this cycle.

use std::sync::{Mutex, TryLockError};
use std::time::{Duration, Instant};

use crate::error::BusError;

/// Polling interval while waiting for a contended lock.
const RETRY_INTERVAL: Duration = Duration::from_millis(1);

pub struct BusLock<T> {
    inner: Mutex<T>,
    timeout: Duration,
}

impl<T> BusLock<T> {
    pub fn new(device: T, timeout_ms: u32) -> Self {
        Self {
            inner: Mutex::new(device),
            timeout: Duration::from_millis(u64::from(timeout_ms)),
        }
    }

    /// Run `op` with exclusive access, waiting at most the configured timeout.
    pub fn with<R>(
        &self,
        op: impl FnOnce(&mut T) -> Result<R, BusError>,
    ) -> Result<R, BusError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.inner.try_lock() {
                Ok(mut guard) => return op(&mut guard),
                // A panicked holder cannot leave a register half-written.
                Err(TryLockError::Poisoned(poisoned)) => return op(&mut poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(BusError::LockTimeout);
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
            }
        }
    }
}
