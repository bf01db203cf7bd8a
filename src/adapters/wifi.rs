//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`] for the one-shot link a wake cycle
//! needs: validate credentials, associate, get an address, and tear
//! down when the upload finishes.  There is no reconnect policy — a
//! battery node that loses WiFi goes back to sleep and tries again next
//! cycle.
//!
//! An unexpected disconnect is forwarded to the upload session as a
//! [`TransportEvent::Disconnected`] through the event bridge, unless
//! the hold-for-update latch is set (a firmware download must survive
//! the broker link dropping).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls via
//!   `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stubs for host-side tests.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::app::events::TransportEvent;
use crate::app::ports::ConnectivityPort;
use crate::config::NodeConfig;
use crate::error::TransportError;

/// Set once an OTA download starts; suppresses sleep-on-disconnect.
static STAY_UP: AtomicBool = AtomicBool::new(false);

// ───────────────────────────────────────────────────────────────
// Credential validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// SSID must be 1-32 printable ASCII bytes.
fn validate_ssid(ssid: &str) -> bool {
    !ssid.is_empty() && ssid.len() <= 32 && is_printable_ascii(ssid)
}

/// Password must be 8-64 bytes for WPA2, or empty for an open network.
fn validate_password(password: &str) -> bool {
    password.is_empty() || (8..=64).contains(&password.len())
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiLink {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    connected: bool,
    #[cfg(target_os = "espidf")]
    driver: Option<esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>>,
}

impl WifiLink {
    /// Validates credentials up front so a misconfigured build fails
    /// its first cycle loudly instead of timing out against thin air.
    pub fn new(config: &NodeConfig) -> Result<Self, TransportError> {
        if !validate_ssid(&config.wifi_ssid) {
            warn!("invalid WiFi SSID");
            return Err(TransportError::WifiFailed);
        }
        if !validate_password(&config.wifi_password) {
            warn!("invalid WiFi password");
            return Err(TransportError::WifiFailed);
        }
        STAY_UP.store(false, Ordering::Relaxed);
        Ok(Self {
            ssid: config.wifi_ssid.clone(),
            password: config.wifi_password.clone(),
            connected: false,
            #[cfg(target_os = "espidf")]
            driver: None,
        })
    }

    /// Attach the started driver (built in main where the modem
    /// peripheral lives).
    #[cfg(target_os = "espidf")]
    pub fn attach(
        &mut self,
        driver: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    ) {
        self.driver = Some(driver);
    }
}

#[cfg(target_os = "espidf")]
impl ConnectivityPort for WifiLink {
    fn connect(&mut self) -> Result<(), TransportError> {
        use esp_idf_svc::wifi::{ClientConfiguration, Configuration};

        let Some(wifi) = self.driver.as_mut() else {
            return Err(TransportError::WifiFailed);
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            ..Default::default()
        });
        info!("connecting to {}...", self.ssid);
        let result = wifi
            .set_configuration(&conf)
            .and_then(|()| wifi.start())
            .and_then(|()| wifi.connect())
            .and_then(|()| wifi.wait_netif_up());
        match result {
            Ok(()) => {
                self.connected = true;
                Ok(())
            }
            Err(e) => {
                warn!("wifi connect failed: {e}");
                Err(TransportError::WifiFailed)
            }
        }
    }

    fn disconnect(&mut self) {
        STAY_UP.store(true, Ordering::Relaxed); // expected disconnect
        if let Some(wifi) = self.driver.as_mut() {
            if let Err(e) = wifi.disconnect() {
                warn!("wifi disconnect failed: {e}");
            }
        }
        self.connected = false;
    }

    fn hold_for_update(&mut self) {
        STAY_UP.store(true, Ordering::Relaxed);
    }
}

#[cfg(not(target_os = "espidf"))]
impl ConnectivityPort for WifiLink {
    fn connect(&mut self) -> Result<(), TransportError> {
        info!("sim: wifi connect to {}", self.ssid);
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        STAY_UP.store(true, Ordering::Relaxed);
        self.connected = false;
    }

    fn hold_for_update(&mut self) {
        STAY_UP.store(true, Ordering::Relaxed);
    }
}

/// Called from the WiFi event subscription on an unexpected link drop.
/// With the latch set (OTA download or deliberate teardown) the drop is
/// ignored; otherwise it surfaces to the blocked upload session.
pub fn on_sta_disconnected() {
    if !STAY_UP.load(Ordering::Relaxed) {
        warn!("wifi link dropped");
        crate::adapters::mqtt::EventBridge::push(TransportEvent::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ssid: &str, password: &str) -> NodeConfig {
        let mut c = NodeConfig::default();
        c.wifi_ssid.push_str(ssid).unwrap();
        c.wifi_password.push_str(password).unwrap();
        c
    }

    #[test]
    fn accepts_valid_credentials() {
        assert!(WifiLink::new(&config("porch-ap", "hunter2hunter2")).is_ok());
        // Open network: empty password is allowed.
        assert!(WifiLink::new(&config("porch-ap", "")).is_ok());
    }

    #[test]
    fn rejects_bad_ssid() {
        assert!(WifiLink::new(&config("", "hunter2hunter2")).is_err());
        assert!(!validate_ssid(&"x".repeat(33)));
        assert!(!validate_ssid("caf\u{e9}-net"));
    }

    #[test]
    fn rejects_short_password() {
        assert!(WifiLink::new(&config("porch-ap", "short")).is_err());
    }
}
