//! Sensor subsystem — individual drivers and the aggregating [`SensorHub`].
//!
//! The hub owns every sensor driver and appends one record per reading
//! into the open datalog group.  A failed sensor is logged and skipped;
//! a wake cycle never aborts because a peripheral is sulking, it just
//! records less.

pub mod battery;
pub mod bme280;

use log::warn;

use battery::BatterySensor;
use bme280::{Bme280Sensor, Calibration};

use crate::datalog::{Datalog, Record};

/// What the wake cycle needs to know after sensing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenseSummary {
    /// Battery under the cutoff; the caller must power down.
    pub battery_critical: bool,
}

/// Aggregates all sensor drivers.
pub struct SensorHub {
    pub battery: BatterySensor,
    pub bme280: Bme280Sensor,
}

impl SensorHub {
    /// Construct a new hub.  Pass in pre-built drivers (built in main
    /// where peripheral ownership is established).
    pub fn new(battery: BatterySensor, bme280: Bme280Sensor) -> Self {
        Self { battery, bme280 }
    }

    /// Read every sensor once and append the results to the open group.
    pub fn sense_all(&mut self, log: &mut Datalog<'_>, calib: &mut Calibration) -> SenseSummary {
        let mut summary = SenseSummary::default();

        match self.battery.read() {
            Ok(r) => {
                log::info!("battery {:.3}V (raw {})", r.volts, r.raw);
                log.append(Record::Battery { volts: r.volts });
                summary.battery_critical = r.critical;
            }
            Err(e) => warn!("battery read failed: {e}"),
        }

        match self.bme280.read(calib) {
            Ok(r) => {
                log::info!(
                    "bme280 {:.2}C {:.1}hPa {:.1}%",
                    r.temperature_c,
                    r.pressure_hpa,
                    r.humidity_pct
                );
                log.append(Record::Environment {
                    temperature_c: r.temperature_c,
                    pressure_hpa: r.pressure_hpa,
                    humidity_pct: r.humidity_pct,
                });
            }
            Err(e) => warn!("bme280 read failed: {e}"),
        }

        summary
    }
}
