//! System configuration parameters
//!
//! All tunable parameters for the envnode sensor. Values are baked in at
//! build time; a deployment overrides them by editing the defaults here
//! (the node has no provisioning surface by design).

use serde::{Deserialize, Serialize};

/// Broker URL / topic capacity. Topics are `<prefix>/data` and
/// `<prefix>/ota`, so the prefix leaves room for the suffix.
pub const URL_MAX: usize = 128;
pub const TOPIC_MAX: usize = 64;

/// Core node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Timing ---
    /// Deep-sleep interval between measurement wakes (seconds)
    pub measure_interval_secs: u32,
    /// Minimum interval between upload attempts (seconds)
    pub upload_interval_secs: u32,
    /// Maximum awake time before the watcher forces sleep (seconds)
    pub max_run_secs: u32,
    /// Extended awake budget while a firmware update is in flight (seconds)
    pub max_ota_run_secs: u32,

    // --- Battery ---
    /// Per-board ADC correction factor applied to the raw reading
    pub voltage_scale: f32,
    /// Below this voltage the node powers down rather than sleeping (volts)
    pub voltage_cutoff: f32,

    // --- Network ---
    pub wifi_ssid: heapless::String<32>,
    pub wifi_password: heapless::String<64>,
    pub mqtt_broker_url: heapless::String<URL_MAX>,
    /// Topic prefix, typically `sensor/<node-name>`
    pub mqtt_topic_prefix: heapless::String<48>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            // Timing
            measure_interval_secs: 300,   // 5 min between readings
            upload_interval_secs: 1800,   // 30 min between uploads
            max_run_secs: 30,
            max_ota_run_secs: 300,

            // Battery
            voltage_scale: 1.0,
            voltage_cutoff: 3.3,

            // Network
            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),
            mqtt_broker_url: heapless::String::new(),
            mqtt_topic_prefix: heapless::String::new(),
        }
    }
}

impl NodeConfig {
    /// Topic the sensor readings are published to.
    pub fn data_topic(&self) -> heapless::String<TOPIC_MAX> {
        let mut t = heapless::String::new();
        let _ = t.push_str(self.mqtt_topic_prefix.as_str());
        let _ = t.push_str("/data");
        t
    }

    /// Retained-command topic the node subscribes to for OTA requests.
    pub fn ota_topic(&self) -> heapless::String<TOPIC_MAX> {
        let mut t = heapless::String::new();
        let _ = t.push_str(self.mqtt_topic_prefix.as_str());
        let _ = t.push_str("/ota");
        t
    }

    /// Microsecond views of the timing knobs, used by the scheduler.
    pub fn measure_interval_us(&self) -> u64 {
        u64::from(self.measure_interval_secs) * 1_000_000
    }

    pub fn upload_interval_us(&self) -> u64 {
        u64::from(self.upload_interval_secs) * 1_000_000
    }

    pub fn max_run_us(&self) -> u64 {
        u64::from(self.max_run_secs) * 1_000_000
    }

    pub fn max_ota_run_us(&self) -> u64 {
        u64::from(self.max_ota_run_secs) * 1_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = NodeConfig::default();
        assert!(c.measure_interval_secs > 0);
        assert!(c.upload_interval_secs >= c.measure_interval_secs);
        assert!(c.max_run_secs > 0);
        assert!(c.max_ota_run_secs > c.max_run_secs);
        assert!(c.voltage_cutoff > 0.0);
        assert!(c.voltage_scale > 0.0);
    }

    #[test]
    fn serde_roundtrip() {
        let mut c = NodeConfig::default();
        c.mqtt_topic_prefix.push_str("sensor/porch").unwrap();
        let json = serde_json::to_string(&c).unwrap();
        let c2: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.measure_interval_secs, c2.measure_interval_secs);
        assert!((c.voltage_cutoff - c2.voltage_cutoff).abs() < 0.001);
        assert_eq!(c.mqtt_topic_prefix, c2.mqtt_topic_prefix);
    }

    #[test]
    fn topics_render_with_prefix() {
        let mut c = NodeConfig::default();
        c.mqtt_topic_prefix.push_str("sensor/porch").unwrap();
        assert_eq!(c.data_topic(), "sensor/porch/data");
        assert_eq!(c.ota_topic(), "sensor/porch/ota");
    }

    #[test]
    fn microsecond_conversions() {
        let c = NodeConfig::default();
        assert_eq!(c.measure_interval_us(), 300_000_000);
        assert_eq!(c.max_run_us(), 30_000_000);
    }
}
