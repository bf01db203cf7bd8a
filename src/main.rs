//! Envnode Firmware — Main Entry Point
//!
//! One wake cycle, then back to deep sleep:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SystemClock   EspPower    WifiLink      MqttAdapter           │
//! │  (ClockPort)   (PowerPort) (Connectivity)(TransportPort)       │
//! │  OtaUpdater    Bme280Sensor + BatterySensor                    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  Datalog (retained ring) · UploadSession · SleepSched  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sleep watcher thread is armed before anything else that can
//! block; whatever happens afterwards, the node goes back to sleep when
//! its run budget expires.
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{info, warn};

use envnode::adapters::mqtt::MqttAdapter;
use envnode::adapters::ota::OtaUpdater;
use envnode::adapters::power::EspPower;
use envnode::adapters::time::SystemClock;
use envnode::adapters::wifi::{self, WifiLink};
use envnode::app::ports::ConnectivityPort;
use envnode::config::NodeConfig;
use envnode::datalog::{Datalog, Record};
use envnode::retained::{self, Retained};
use envnode::sensors::battery::BatterySensor;
use envnode::sensors::bme280::Bme280Sensor;
use envnode::sensors::SensorHub;
use envnode::sleep::SleepScheduler;
use envnode::pins;
use envnode::upload::{UploadOutcome, UploadSession};

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    let config = NodeConfig::default();

    // ── 2. Sleep scheduler + watcher ──────────────────────────
    // Armed first: from here on the node cannot get stuck awake.
    let clock = SystemClock::new();
    let mut power = EspPower::new();
    let sched = Arc::new(SleepScheduler::new(
        &clock,
        &power,
        config.max_run_us(),
        config.max_ota_run_us(),
    ));
    info!(
        "envnode v{} wake at {}us (from_sleep={})",
        env!("CARGO_PKG_VERSION"),
        sched.wake_time_us(),
        sched.wake_from_sleep()
    );

    let retained = retained::take(sched.wake_from_sleep())
        .ok_or_else(|| anyhow!("retained region already taken"))?;
    if retained.cold {
        info!("cold boot, retained region reinitialised");
    }
    sched.spawn_watcher(
        SystemClock::new(),
        EspPower::new(),
        retained.cells,
        config.measure_interval_us(),
    )?;

    // ── 3. Measure ────────────────────────────────────────────
    let Retained {
        ring, cells, calib, ..
    } = retained;
    let mut log = Datalog::new(ring, sched.wake_time_us());
    log.append(Record::Wake {
        wake_time_us: sched.wake_time_us(),
        last_sleep_us: cells.last_sleep_us(),
    });

    if let Err(e) = Bme280Sensor::init_bus() {
        warn!("i2c init failed: {e}");
    }
    let mut hub = SensorHub::new(
        BatterySensor::new(config.voltage_scale, config.voltage_cutoff),
        Bme280Sensor::new(pins::BME280_ADDR),
    );
    let summary = hub.sense_all(&mut log, calib);
    log.finalize();

    // ── 4. Battery-critical shutdown ──────────────────────────
    // Terminal: every domain off, no wake alarm. The readings stay in
    // the ring and are lost with it; protecting the pack comes first.
    if summary.battery_critical {
        sched.shutdown(&mut power);
    }

    // ── 5. Upload, when due ───────────────────────────────────
    if sched.wake_time_us() >= cells.next_upload_us() {
        cells.set_next_upload_us(sched.wake_time_us() + config.upload_interval_us());
        match run_upload(&config, &mut log, &sched) {
            Ok(UploadOutcome::Complete { published }) => {
                info!("upload complete, {published} groups published");
            }
            Ok(UploadOutcome::OtaInProgress) => {
                // The download thread reboots the node; the extended
                // deadline caps how long a stalled one can hold us up.
                info!("firmware update in flight, staying awake");
                loop {
                    std::thread::park();
                }
            }
            Err(e) => warn!("upload failed: {e}"),
        }
    } else {
        info!(
            "upload not due until {}us, skipping network",
            cells.next_upload_us()
        );
    }

    // ── 6. Back to sleep ──────────────────────────────────────
    // The watcher thread does the actual power-down; this task just
    // signals it and parks.
    sched.request_sleep();
    loop {
        std::thread::park();
    }
}

/// Bring the network up and run one upload session.  Failures leave
/// unacknowledged groups in the ring for the next due cycle.
fn run_upload(
    config: &NodeConfig,
    log: &mut Datalog<'_>,
    sched: &SleepScheduler,
) -> Result<UploadOutcome> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{BlockingWifi, EspWifi, WifiEvent};

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let mut link = WifiLink::new(config)?;
    link.attach(BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?,
        sysloop.clone(),
    )?);

    // An unexpected link drop surfaces as a transport event so the
    // session aborts instead of blocking out its whole run budget.
    let _wifi_events = sysloop.subscribe::<WifiEvent, _>(|event| {
        if matches!(event, WifiEvent::StaDisconnected(_)) {
            wifi::on_sta_disconnected();
        }
    })?;

    link.connect()?;

    let mut transport = MqttAdapter::connect(&config.mqtt_broker_url)?;
    let mut ota = OtaUpdater::new();
    let mut session =
        UploadSession::new(&mut transport, config.data_topic(), config.ota_topic());
    let outcome = session.run(log, sched, &mut link, &mut ota);

    if !matches!(outcome, Ok(UploadOutcome::OtaInProgress)) {
        link.disconnect();
    }
    Ok(outcome?)
}
