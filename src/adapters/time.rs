//! System clock adapter.
//!
//! Implements [`ClockPort`] over a time base that keeps counting through
//! deep sleep:
//!
//! - **`target_os = "espidf"`** — `gettimeofday`, which ESP-IDF backs
//!   with the RTC timer across deep sleep.  `esp_timer_get_time` would
//!   NOT work here: it restarts at zero on every wake.
//! - **all other targets** — `std::time::Instant` anchored at process
//!   start (host tests never sleep).

use crate::app::ports::ClockPort;

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for SystemClock {
    #[cfg(target_os = "espidf")]
    fn now_us(&self) -> u64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: plain libc call writing into the local timeval.
        unsafe {
            esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut());
        }
        tv.tv_sec as u64 * 1_000_000 + tv.tv_usec as u64
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}
