//! Monotonic millisecond tick source.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer.
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation.
//!
//! Both truncate to a 32-bit [`Tick`], which wraps roughly every 49.7
//! days; every consumer measures intervals with
//! [`elapsed_since`](crate::clock::elapsed_since).

use crate::clock::Tick;

pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot, wrapping at `u32::MAX`.
    #[cfg(target_os = "espidf")]
    pub fn now_ms(&self) -> Tick {
        let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() } as u64;
        (us / 1_000) as Tick
    }

    /// Milliseconds since construction, wrapping at `u32::MAX`.
    #[cfg(not(target_os = "espidf"))]
    pub fn now_ms(&self) -> Tick {
        self.start.elapsed().as_millis() as Tick
    }
}
