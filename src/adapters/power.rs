//! Deep-sleep and wake-cause adapter.
//!
//! Implements [`PowerPort`] over the ESP-IDF sleep API.  The host build
//! substitutes a simulation with an injectable wake cause so scheduler
//! behavior can be driven from tests without a chip to power down.

use log::info;

use crate::app::ports::{PowerPort, WakeCause};

// ───────────────────────────────────────────────────────────────
// ESP-IDF implementation
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspPower;

#[cfg(target_os = "espidf")]
impl EspPower {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl Default for EspPower {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl PowerPort for EspPower {
    fn wake_cause(&self) -> WakeCause {
        // SAFETY: reads a status register set by the boot ROM.
        let cause = unsafe { esp_idf_svc::sys::esp_sleep_get_wakeup_cause() };
        match cause {
            esp_idf_svc::sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeCause::Timer,
            esp_idf_svc::sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => WakeCause::PowerOn,
            _ => WakeCause::Other,
        }
    }

    fn radio_off(&mut self) {
        // SAFETY: idempotent; returns an error if WiFi never started,
        // which is fine on cycles that skipped the upload.
        unsafe {
            esp_idf_svc::sys::esp_wifi_stop();
        }
    }

    fn arm_timer_wakeup(&mut self, interval_us: u64) {
        // SAFETY: configures the RTC wake alarm; no memory involved.
        unsafe {
            esp_idf_svc::sys::esp_deep_sleep_disable_rom_logging();
            esp_idf_svc::sys::esp_sleep_enable_timer_wakeup(interval_us);
        }
    }

    fn enter_deep_sleep(&mut self) {
        info!("deep sleep");
        // SAFETY: does not return; execution resumes via the bootloader.
        unsafe {
            esp_idf_svc::sys::esp_deep_sleep_start();
        }
    }

    fn power_down_all(&mut self) {
        // SAFETY: forcing every domain off is exactly the intent of the
        // terminal shutdown; retained memory is sacrificed knowingly.
        unsafe {
            for domain in 0..esp_idf_svc::sys::esp_sleep_pd_domain_t_ESP_PD_DOMAIN_MAX {
                esp_idf_svc::sys::esp_sleep_pd_config(
                    domain,
                    esp_idf_svc::sys::esp_sleep_pd_option_t_ESP_PD_OPTION_OFF,
                );
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

/// Host stand-in: remembers an injected wake cause and logs power calls.
#[cfg(not(target_os = "espidf"))]
pub struct EspPower {
    cause: WakeCause,
}

#[cfg(not(target_os = "espidf"))]
impl EspPower {
    pub fn new() -> Self {
        Self {
            cause: WakeCause::PowerOn,
        }
    }

    pub fn with_wake_cause(cause: WakeCause) -> Self {
        Self { cause }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for EspPower {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl PowerPort for EspPower {
    fn wake_cause(&self) -> WakeCause {
        self.cause
    }

    fn radio_off(&mut self) {
        info!("sim: radio off");
    }

    fn arm_timer_wakeup(&mut self, interval_us: u64) {
        info!("sim: timer wakeup in {interval_us}us");
    }

    fn enter_deep_sleep(&mut self) {
        info!("sim: deep sleep");
    }

    fn power_down_all(&mut self) {
        info!("sim: all power domains off");
    }
}
