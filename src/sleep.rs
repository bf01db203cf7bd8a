//! Deep-sleep scheduling.
//!
//! The node's overriding rule is "always go back to sleep": a watcher
//! thread arms itself with a deadline at boot and puts the chip into
//! deep sleep when it passes, no matter what the wake-cycle task is
//! doing.  The task can only move the deadline — forward to zero when
//! its work is done, or out to the OTA budget when an update is in
//! flight.
//!
//! ```text
//!   Running ──watcher picks up deadline──▶ WaitingForDeadline
//!      │                                          │
//!      │ request_sleep() / deadline passes        │
//!      ▼                                          ▼
//!   (radio off → arm timer alarm → record sleep time → deep sleep)
//!                                              Sleeping
//! ```
//!
//! The wait is an interruptible condvar timeout, the only cancellation
//! mechanism in the firmware.  Battery-critical shutdown bypasses the
//! watcher entirely: it powers every domain off and sleeps with no
//! alarm, which never resumes.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::{info, warn};

use crate::app::ports::{ClockPort, PowerPort, WakeCause};
use crate::error::{Error, Result};
use crate::retained::SleepCells;

// ── State ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepState {
    /// Normal wake-cycle execution, watcher not yet waiting.
    Running,
    /// Watcher blocked until the deadline or a notification.
    WaitingForDeadline,
    /// Committed to entering deep sleep.
    Sleeping,
}

struct WatchInner {
    deadline_us: u64,
    state: SleepState,
}

struct WatchShared {
    inner: Mutex<WatchInner>,
    cond: Condvar,
}

// ── Scheduler ─────────────────────────────────────────────────

pub struct SleepScheduler {
    shared: Arc<WatchShared>,
    wake_time_us: u64,
    wake_from_sleep: bool,
    max_ota_run_us: u64,
}

impl SleepScheduler {
    /// Record this cycle's wake time and derive the sleep deadline.
    pub fn new(
        clock: &dyn ClockPort,
        power: &dyn PowerPort,
        max_run_us: u64,
        max_ota_run_us: u64,
    ) -> Self {
        let wake_time_us = clock.now_us();
        let wake_from_sleep = power.wake_cause() == WakeCause::Timer;
        Self {
            shared: Arc::new(WatchShared {
                inner: Mutex::new(WatchInner {
                    deadline_us: wake_time_us + max_run_us,
                    state: SleepState::Running,
                }),
                cond: Condvar::new(),
            }),
            wake_time_us,
            wake_from_sleep,
            max_ota_run_us,
        }
    }

    /// Microsecond timestamp of this wake.
    pub fn wake_time_us(&self) -> u64 {
        self.wake_time_us
    }

    /// True when this boot resumed from the deep-sleep timer alarm.
    pub fn wake_from_sleep(&self) -> bool {
        self.wake_from_sleep
    }

    pub fn state(&self) -> SleepState {
        self.lock().state
    }

    /// Current forced-sleep deadline.
    pub fn deadline_us(&self) -> u64 {
        self.lock().deadline_us
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatchInner> {
        // The watcher never panics while holding the lock.
        match self.shared.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Ask the watcher to put the node to sleep now.
    pub fn request_sleep(&self) {
        self.lock().deadline_us = 0;
        self.shared.cond.notify_all();
    }

    /// Extend the deadline to the OTA budget so a firmware download is
    /// not cut off at the normal run limit.
    pub fn note_ota_start(&self) {
        info!("extending run deadline for firmware update");
        self.lock().deadline_us = self.wake_time_us + self.max_ota_run_us;
        self.shared.cond.notify_all();
    }

    /// Battery-critical shutdown: every power domain off, no wake alarm.
    /// The node stays down until physically recharged and reset.
    pub fn shutdown(&self, power: &mut dyn PowerPort) {
        warn!("battery critical, powering down");
        self.lock().state = SleepState::Sleeping;
        power.radio_off();
        power.power_down_all();
        power.enter_deep_sleep();
    }

    /// Start the watcher on its own thread.  On the device this thread
    /// outlives the wake-cycle task and is what actually enters sleep.
    pub fn spawn_watcher<C, P>(
        self: &Arc<Self>,
        clock: C,
        mut power: P,
        cells: &'static SleepCells,
        measure_interval_us: u64,
    ) -> Result<()>
    where
        C: ClockPort + Send + 'static,
        P: PowerPort + Send + 'static,
    {
        let this = Arc::clone(self);
        std::thread::Builder::new()
            .name("sleep-watcher".into())
            .stack_size(8 * 1024)
            .spawn(move || this.run_watcher(&clock, &mut power, cells, measure_interval_us))
            .map_err(|_| Error::Init("sleep watcher spawn failed"))?;
        Ok(())
    }

    /// Watcher body: wait out the deadline, then enter deep sleep.
    /// Factored out of [`SleepScheduler::spawn_watcher`] so tests can
    /// drive it with mock ports on the test thread.
    pub fn run_watcher(
        &self,
        clock: &dyn ClockPort,
        power: &mut dyn PowerPort,
        cells: &SleepCells,
        measure_interval_us: u64,
    ) {
        let mut inner = self.lock();
        loop {
            let now = clock.now_us();
            if now >= inner.deadline_us {
                break;
            }
            inner.state = SleepState::WaitingForDeadline;
            let wait = Duration::from_micros(inner.deadline_us - now);
            // Timeouts and spurious wakeups both land back in the loop,
            // which re-reads the (possibly moved) deadline.
            inner = match self.shared.cond.wait_timeout(inner, wait) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        inner.state = SleepState::Sleeping;
        drop(inner);

        info!("entering deep sleep for {measure_interval_us}us");
        power.radio_off();
        power.arm_timer_wakeup(measure_interval_us);
        cells.set_last_sleep_us(clock.now_us());
        power.enter_deep_sleep();
    }
}
