//! Full wake-cycle test: claim the retained region, sense, upload,
//! then let the watcher force deep sleep.
//!
//! The retained region is a process-wide singleton, so the whole boot
//! lifecycle runs in one sequential test.

use envnode::app::events::TransportEvent;
use envnode::app::ports::WakeCause;
use envnode::config::NodeConfig;
use envnode::datalog::{Datalog, Record};
use envnode::retained;
use envnode::sensors::battery::{self, BatterySensor};
use envnode::sensors::bme280::{self, Bme280Sensor};
use envnode::sensors::SensorHub;
use envnode::sleep::SleepScheduler;
use envnode::upload::{UploadOutcome, UploadSession};

use crate::mock_hw::{MockClock, MockConnectivity, MockOta, MockPower, MockTransport, PowerCall};

const WAKE_US: u64 = 7_000_000;

/// Datasheet worked-example trim registers, little-endian pairs.
fn datasheet_registers() -> ([u8; 26], [u8; 7], [u8; 8]) {
    let calib_tp = [
        0x70, 0x6B, // T1 = 27504
        0x43, 0x67, // T2 = 26435
        0x18, 0xFC, // T3 = -1000
        0x7D, 0x8E, // P1 = 36477
        0x43, 0xD6, // P2 = -10685
        0xD0, 0x0B, // P3 = 3024
        0x27, 0x0B, // P4 = 2855
        0x8C, 0x00, // P5 = 140
        0xF9, 0xFF, // P6 = -7
        0x8C, 0x3C, // P7 = 15500
        0xF8, 0xC6, // P8 = -14600
        0x70, 0x17, // P9 = 6000
        0x00, 0x4B, // (0xA0 gap), H1 = 75
    ];
    let calib_h = [0x6B, 0x01, 0x00, 0x14, 0x08, 0x00, 0x1E];
    // adc_P = 415148, adc_T = 519888 (the datasheet example inputs).
    let burst = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x6B, 0x2A];
    (calib_tp, calib_h, burst)
}

fn test_config() -> NodeConfig {
    let mut c = NodeConfig::default();
    c.voltage_scale = 2.0;
    c.mqtt_topic_prefix.push_str("sensor/attic").unwrap();
    c
}

#[test]
fn full_wake_cycle_measure_upload_sleep() {
    let config = test_config();
    let clock = MockClock::at(WAKE_US);
    let mut power = MockPower::new(WakeCause::PowerOn);
    let sched = SleepScheduler::new(
        &clock,
        &power,
        config.max_run_us(),
        config.max_ota_run_us(),
    );
    assert!(!sched.wake_from_sleep());

    // ── Claim the retained region (cold boot) ─────────────────
    let retained = retained::take(sched.wake_from_sleep()).unwrap();
    assert!(retained.cold);
    assert!(retained.ring.is_empty());
    assert_eq!(retained.cells.last_sleep_us(), 0);

    // ── Sense ─────────────────────────────────────────────────
    let (tp, h, burst) = datasheet_registers();
    bme280::sim_set_registers(tp, h, burst);
    battery::sim_set_battery_adc(4095);

    let mut log = Datalog::new(retained.ring, sched.wake_time_us());
    log.append(Record::Wake {
        wake_time_us: sched.wake_time_us(),
        last_sleep_us: retained.cells.last_sleep_us(),
    });
    let mut hub = SensorHub::new(
        BatterySensor::new(config.voltage_scale, config.voltage_cutoff),
        Bme280Sensor::new(0x76),
    );
    let summary = hub.sense_all(&mut log, retained.calib);
    log.finalize();

    assert!(!summary.battery_critical);
    assert!(retained.calib.is_loaded());
    assert_eq!(retained.calib.dig_t1, 27504);
    assert!(!log.is_empty());

    // ── Upload (due immediately on a cold boot) ───────────────
    assert!(sched.wake_time_us() >= retained.cells.next_upload_us());
    retained
        .cells
        .set_next_upload_us(sched.wake_time_us() + config.upload_interval_us());

    let mut transport = MockTransport::scripted(vec![
        TransportEvent::Connected,
        TransportEvent::Subscribed,
        TransportEvent::Published(1), // probe ack
        TransportEvent::Published(2), // data ack
        TransportEvent::Message {
            topic: config.ota_topic(),
            payload: heapless::Vec::new(), // no command pending
        },
    ]);
    let mut conn = MockConnectivity::default();
    let mut ota = MockOta::default();
    let mut session =
        UploadSession::new(&mut transport, config.data_topic(), config.ota_topic());
    let outcome = session.run(&mut log, &sched, &mut conn, &mut ota);

    assert_eq!(outcome, Ok(UploadOutcome::Complete { published: 1 }));
    assert!(log.is_empty(), "the acked group left retained memory");
    assert_eq!(transport.subscribed, vec!["sensor/attic/ota".to_string()]);

    // The one data publish carries the whole cycle as flat JSON.
    let data = transport
        .published
        .iter()
        .find(|p| p.topic == "sensor/attic/data")
        .unwrap();
    let json = String::from_utf8(data.payload.clone()).unwrap();
    assert!(json.starts_with('{') && json.ends_with('}'));
    assert!(json.contains("\"boot_time\":7000000"), "{json}");
    assert!(json.contains("\"latest\":1"), "{json}");
    assert!(json.contains("\"battery\":4.400"), "{json}");
    assert!(json.contains("\"temperature\":25.08"), "{json}");
    assert!(json.contains("\"pressure\":"), "{json}");
    assert!(json.contains("\"humidity\":"), "{json}");
    assert!(ota.urls.is_empty());

    // ── Watcher forces sleep once the deadline passes ─────────
    let asleep_at = WAKE_US + config.max_run_us() + 1;
    clock.advance_to(asleep_at);
    sched.run_watcher(
        &clock,
        &mut power,
        retained.cells,
        config.measure_interval_us(),
    );
    assert_eq!(
        power.calls.lock().unwrap().as_slice(),
        &[
            PowerCall::RadioOff,
            PowerCall::ArmTimer(config.measure_interval_us()),
            PowerCall::DeepSleep,
        ]
    );
    assert_eq!(retained.cells.last_sleep_us(), asleep_at);

    // The region hands itself out exactly once per boot.
    assert!(retained::take(true).is_none());
}
