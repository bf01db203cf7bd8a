//! The retained low-power memory region.
//!
//! Everything that must survive deep sleep lives in one `#[repr(C)]`
//! block: the datalog ring, the sleep scheduler's timestamp cells and
//! the BME280 calibration. On the device the static carries
//! `#[link_section = ".rtc.data"]` so it lands in RTC slow memory, which
//! keeps its contents across deep sleep but not across reset or power
//! loss.
//!
//! Access goes through [`take`], which hands the region out exactly once
//! per boot and applies the cold-boot rule: if this is not a deep-sleep
//! resume, or the magic word is missing, the whole region is
//! reinitialised before anyone sees it.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::datalog::Ring;
use crate::sensors::bme280::Calibration;

/// Guards against interpreting garbage as state after a power cycle.
const MAGIC: u32 = 0x444C_4F47;

// ── Sleep cells ───────────────────────────────────────────────

/// Timestamps shared between the wake-cycle task and the deep-sleep
/// watcher thread.  Atomics because the watcher writes the sleep time
/// from its own thread moments before the chip powers down.
#[repr(C)]
pub struct SleepCells {
    last_sleep_us: AtomicU64,
    next_upload_us: AtomicU64,
}

impl SleepCells {
    pub const fn new() -> Self {
        Self {
            last_sleep_us: AtomicU64::new(0),
            next_upload_us: AtomicU64::new(0),
        }
    }

    fn reset(&self) {
        self.last_sleep_us.store(0, Ordering::Relaxed);
        self.next_upload_us.store(0, Ordering::Relaxed);
    }

    /// When the previous cycle entered deep sleep; zero on cold boot.
    pub fn last_sleep_us(&self) -> u64 {
        self.last_sleep_us.load(Ordering::Relaxed)
    }

    pub fn set_last_sleep_us(&self, t: u64) {
        self.last_sleep_us.store(t, Ordering::Relaxed);
    }

    /// Earliest wake time at which the next upload should be attempted.
    pub fn next_upload_us(&self) -> u64 {
        self.next_upload_us.load(Ordering::Relaxed)
    }

    pub fn set_next_upload_us(&self, t: u64) {
        self.next_upload_us.store(t, Ordering::Relaxed);
    }
}

impl Default for SleepCells {
    fn default() -> Self {
        Self::new()
    }
}

// ── Region layout ─────────────────────────────────────────────

#[repr(C)]
struct RetainedState {
    magic: u32,
    ring: Ring,
    cells: SleepCells,
    calib: Calibration,
}

struct Region(UnsafeCell<RetainedState>);

// SAFETY: the region is only reachable through `take`, which uses the
// TAKEN flag to hand out its contents at most once per boot.
unsafe impl Sync for Region {}

#[cfg_attr(target_os = "espidf", link_section = ".rtc.data")]
static REGION: Region = Region(UnsafeCell::new(RetainedState {
    magic: 0,
    ring: Ring::new(),
    cells: SleepCells::new(),
    calib: Calibration::new(),
}));

static TAKEN: AtomicBool = AtomicBool::new(false);

// ── Borrow split ──────────────────────────────────────────────

/// Disjoint borrows of the retained region, valid for the rest of the
/// boot.  `cells` stays shared (the watcher thread holds it too); the
/// ring and calibration go to their single owners.
pub struct Retained {
    pub ring: &'static mut Ring,
    pub cells: &'static SleepCells,
    pub calib: &'static mut Calibration,
    /// True when the region was reinitialised this boot.
    pub cold: bool,
}

/// Claim the retained region.  `wake_from_sleep` comes from the wake
/// cause; anything other than a deep-sleep resume invalidates the
/// region.  Returns `None` on a second call in the same boot.
pub fn take(wake_from_sleep: bool) -> Option<Retained> {
    if TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // SAFETY: the swap above guarantees this is the only live reference
    // into the region for the rest of the boot.
    let state = unsafe { &mut *REGION.0.get() };
    let cold = !wake_from_sleep || state.magic != MAGIC;
    if cold {
        state.ring.reset();
        state.cells.reset();
        state.calib.reset();
        state.magic = MAGIC;
    }
    let RetainedState {
        ring, cells, calib, ..
    } = state;
    Some(Retained {
        ring,
        cells,
        calib,
        cold,
    })
}
