//! BME280 temperature / pressure / humidity sensor.
//!
//! One forced-mode measurement per wake cycle over I2C.  The factory
//! calibration block is read once per cold boot and parked in the
//! retained region, so warm wakes skip the 33-byte register dance.
//!
//! Compensation uses the integer formulas from the Bosch datasheet
//! (section 4.2.3), kept as pure functions on [`Calibration`] so they
//! run under host tests against the datasheet's worked example.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: legacy I2C master driver, as a thin shim.
//! On host/test: injectable burst data and failure flag.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(target_os = "espidf"))]
use std::sync::Mutex;

use log::warn;

use crate::error::SensorError;

// ── Register map ──────────────────────────────────────────────

const REG_CALIB_TP: u8 = 0x88; // 26 bytes: T1..T3, P1..P9, H1
const REG_CALIB_H: u8 = 0xE1; // 7 bytes: H2..H6
const REG_CTRL_HUM: u8 = 0xF2;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_DATA: u8 = 0xF7; // 8 bytes: press, temp, hum

/// ctrl_meas: 1x oversampling for temperature and pressure, forced mode.
const CTRL_MEAS_FORCED: u8 = (0x1 << 5) | (0x1 << 2) | 0x1;
/// ctrl_hum: 1x humidity oversampling.
const CTRL_HUM_OS1: u8 = 0x1;

/// Worst-case forced-measurement time at 1x oversampling.
const MEASURE_DELAY_MS: u32 = 18;

/// I2C transaction timeout: 50 ms at the default 100 Hz tick.
#[cfg(target_os = "espidf")]
const I2C_TIMEOUT_TICKS: u32 = 5;

// ── Calibration ───────────────────────────────────────────────

/// Factory trim values, laid out `#[repr(C)]` for the retained region.
/// `loaded` doubles as the did-init flag across deep sleeps.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Calibration {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
    pub dig_h1: u8,
    pub dig_h3: u8,
    pub dig_h2: i16,
    pub dig_h4: i16,
    pub dig_h5: i16,
    pub dig_h6: i8,
    loaded: u8,
}

fn load_u16(p: &[u8]) -> u16 {
    u16::from(p[1]) << 8 | u16::from(p[0])
}

impl Calibration {
    pub const fn new() -> Self {
        Self {
            dig_t1: 0,
            dig_t2: 0,
            dig_t3: 0,
            dig_p1: 0,
            dig_p2: 0,
            dig_p3: 0,
            dig_p4: 0,
            dig_p5: 0,
            dig_p6: 0,
            dig_p7: 0,
            dig_p8: 0,
            dig_p9: 0,
            dig_h1: 0,
            dig_h3: 0,
            dig_h2: 0,
            dig_h4: 0,
            dig_h5: 0,
            dig_h6: 0,
            loaded: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// True once the trim registers have been read this power cycle.
    pub fn is_loaded(&self) -> bool {
        self.loaded != 0
    }

    /// Fill from the raw register blocks (0x88.. and 0xE1..).
    pub fn parse(&mut self, tp: &[u8; 26], h: &[u8; 7]) {
        self.dig_t1 = load_u16(&tp[0..]);
        self.dig_t2 = load_u16(&tp[2..]) as i16;
        self.dig_t3 = load_u16(&tp[4..]) as i16;
        self.dig_p1 = load_u16(&tp[6..]);
        self.dig_p2 = load_u16(&tp[8..]) as i16;
        self.dig_p3 = load_u16(&tp[10..]) as i16;
        self.dig_p4 = load_u16(&tp[12..]) as i16;
        self.dig_p5 = load_u16(&tp[14..]) as i16;
        self.dig_p6 = load_u16(&tp[16..]) as i16;
        self.dig_p7 = load_u16(&tp[18..]) as i16;
        self.dig_p8 = load_u16(&tp[20..]) as i16;
        self.dig_p9 = load_u16(&tp[22..]) as i16;
        self.dig_h1 = tp[25];
        self.dig_h2 = load_u16(&h[0..]) as i16;
        self.dig_h3 = h[2];
        // H4/H5 share a nibble-packed byte.
        self.dig_h4 = (i16::from(h[3]) << 4) | i16::from(h[4] & 0x0f);
        self.dig_h5 = i16::from(h[4] >> 4) | (i16::from(h[5]) << 4);
        self.dig_h6 = h[6] as i8;
        self.loaded = 1;
    }

    /// Shared fine-temperature term feeding all three outputs.
    pub fn t_fine(&self, adc_t: i32) -> i32 {
        let t1 = i32::from(self.dig_t1);
        let t2 = i32::from(self.dig_t2);
        let t3 = i32::from(self.dig_t3);
        let var1 = (((adc_t >> 3) - (t1 << 1)) * t2) >> 11;
        let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * t3) >> 14;
        var1 + var2
    }

    pub fn temperature_c(t_fine: i32) -> f32 {
        t_fine as f32 / 5120.0
    }

    pub fn pressure_hpa(&self, t_fine: i32, adc_p: i32) -> f32 {
        let p1 = i64::from(self.dig_p1);
        let p2 = i64::from(self.dig_p2);
        let p3 = i64::from(self.dig_p3);
        let p4 = i64::from(self.dig_p4);
        let p5 = i64::from(self.dig_p5);
        let p6 = i64::from(self.dig_p6);
        let p7 = i64::from(self.dig_p7);
        let p8 = i64::from(self.dig_p8);
        let p9 = i64::from(self.dig_p9);

        let mut var1 = i64::from(t_fine) - 128_000;
        let mut var2 = var1 * var1 * p6;
        var2 += (var1 * p5) << 17;
        var2 += p4 << 35;
        var1 = ((var1 * var1 * p3) >> 8) + ((var1 * p2) << 12);
        var1 = (((1i64 << 47) + var1) * p1) >> 33;
        if var1 == 0 {
            return 0.0;
        }
        let mut p = 1_048_576 - i64::from(adc_p);
        p = (((p << 31) - var2) * 3125) / var1;
        var1 = (p9 * (p >> 13) * (p >> 13)) >> 25;
        var2 = (p8 * p) >> 19;
        p = ((p + var1 + var2) >> 8) + (p7 << 4);
        // Q24.8 pascals -> hectopascals.
        p as u32 as f32 / 25600.0
    }

    pub fn humidity_pct(&self, t_fine: i32, adc_h: i32) -> f32 {
        let h1 = i32::from(self.dig_h1);
        let h2 = i32::from(self.dig_h2);
        let h3 = i32::from(self.dig_h3);
        let h4 = i32::from(self.dig_h4);
        let h5 = i32::from(self.dig_h5);
        let h6 = i32::from(self.dig_h6);

        let v = t_fine - 76_800;
        let mut v = ((((adc_h << 14) - (h4 << 20) - (h5 * v)) + 16_384) >> 15)
            * (((((((v * h6) >> 10) * (((v * h3) >> 11) + 32_768)) >> 10) + 2_097_152) * h2
                + 8_192)
                >> 14);
        v -= (((((v >> 15) * (v >> 15)) >> 7) * h1) >> 4);
        let v = v.clamp(0, 419_430_400);
        (v >> 12) as f32 / 1024.0
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

// ── Reading ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct EnvironmentReading {
    pub temperature_c: f32,
    pub pressure_hpa: f32,
    pub humidity_pct: f32,
}

/// Unpack the 8-byte burst from 0xF7: 20-bit pressure and temperature,
/// 16-bit humidity.
fn unpack_burst(data: &[u8; 8]) -> (i32, i32, i32) {
    let adc_p = (i32::from(data[0]) << 12) | (i32::from(data[1]) << 4) | (i32::from(data[2]) >> 4);
    let adc_t = (i32::from(data[3]) << 12) | (i32::from(data[4]) << 4) | (i32::from(data[5]) >> 4);
    let adc_h = (i32::from(data[6]) << 8) | i32::from(data[7]);
    (adc_p, adc_t, adc_h)
}

// ── Sensor driver ─────────────────────────────────────────────

pub struct Bme280Sensor {
    _addr: u8,
}

impl Bme280Sensor {
    pub fn new(addr: u8) -> Self {
        Self { _addr: addr }
    }

    /// One forced measurement.  Loads calibration into `calib` on the
    /// first call after a power cycle.
    pub fn read(&mut self, calib: &mut Calibration) -> Result<EnvironmentReading, SensorError> {
        if !calib.is_loaded() {
            self.platform_load_calibration(calib)?;
        }

        self.platform_write_reg(REG_CTRL_MEAS, CTRL_MEAS_FORCED)?;
        self.platform_delay_ms(MEASURE_DELAY_MS);

        let mut data = [0u8; 8];
        self.platform_read_regs(REG_DATA, &mut data)?;

        let (adc_p, adc_t, adc_h) = unpack_burst(&data);
        let t_fine = calib.t_fine(adc_t);
        Ok(EnvironmentReading {
            temperature_c: Calibration::temperature_c(t_fine),
            pressure_hpa: calib.pressure_hpa(t_fine, adc_p),
            humidity_pct: calib.humidity_pct(t_fine, adc_h),
        })
    }

    fn platform_load_calibration(&mut self, calib: &mut Calibration) -> Result<(), SensorError> {
        let mut tp = [0u8; 26];
        self.platform_read_regs(REG_CALIB_TP, &mut tp)?;
        let mut h = [0u8; 7];
        self.platform_read_regs(REG_CALIB_H, &mut h)?;
        calib.parse(&tp, &h);
        // Humidity sampling must be armed before the first measurement.
        self.platform_write_reg(REG_CTRL_HUM, CTRL_HUM_OS1)?;
        Ok(())
    }

    // ── ESP-IDF platform shims ────────────────────────────────

    /// Install and configure the I2C master driver.  Must run once per
    /// boot before any read.
    #[cfg(target_os = "espidf")]
    pub fn init_bus() -> Result<(), SensorError> {
        use crate::pins;
        // SAFETY: called once during bootstrap, before sensor reads.
        let ret = unsafe {
            let conf = esp_idf_sys::i2c_config_t {
                mode: esp_idf_sys::i2c_mode_t_I2C_MODE_MASTER,
                sda_io_num: pins::I2C_SDA_GPIO,
                scl_io_num: pins::I2C_SCL_GPIO,
                sda_pullup_en: true,
                scl_pullup_en: true,
                __bindgen_anon_1: esp_idf_sys::i2c_config_t__bindgen_ty_1 {
                    master: esp_idf_sys::i2c_config_t__bindgen_ty_1__bindgen_ty_1 {
                        clk_speed: pins::I2C_FREQ_HZ,
                    },
                },
                clk_flags: 0,
            };
            let ret = esp_idf_sys::i2c_param_config(0, &conf);
            if ret != esp_idf_sys::ESP_OK {
                ret
            } else {
                esp_idf_sys::i2c_driver_install(
                    0,
                    esp_idf_sys::i2c_mode_t_I2C_MODE_MASTER,
                    0,
                    0,
                    0,
                )
            }
        };
        if ret == esp_idf_sys::ESP_OK {
            Ok(())
        } else {
            warn!("i2c init failed: {ret}");
            Err(SensorError::NotResponding)
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        let buf = [reg, value];
        // SAFETY: init_bus installed the I2C driver during bootstrap.
        let ret = unsafe {
            esp_idf_sys::i2c_master_write_to_device(
                0,
                self._addr,
                buf.as_ptr(),
                buf.len(),
                I2C_TIMEOUT_TICKS,
            )
        };
        if ret == esp_idf_sys::ESP_OK {
            Ok(())
        } else {
            warn!("bme280 write reg {reg:#x} failed: {ret}");
            Err(SensorError::I2cFailed)
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_read_regs(&mut self, reg: u8, out: &mut [u8]) -> Result<(), SensorError> {
        // SAFETY: as above; write-then-read is one transaction.
        let ret = unsafe {
            esp_idf_sys::i2c_master_write_read_device(
                0,
                self._addr,
                &reg,
                1,
                out.as_mut_ptr(),
                out.len(),
                I2C_TIMEOUT_TICKS,
            )
        };
        if ret == esp_idf_sys::ESP_OK {
            Ok(())
        } else {
            warn!("bme280 read reg {reg:#x} failed: {ret}");
            Err(SensorError::I2cFailed)
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_delay_ms(&self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }

    // ── Host simulation ───────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn platform_write_reg(&mut self, _reg: u8, _value: u8) -> Result<(), SensorError> {
        if SIM_FAIL.load(Ordering::Relaxed) {
            return Err(SensorError::I2cFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_read_regs(&mut self, reg: u8, out: &mut [u8]) -> Result<(), SensorError> {
        if SIM_FAIL.load(Ordering::Relaxed) {
            return Err(SensorError::I2cFailed);
        }
        match reg {
            REG_CALIB_TP => out.copy_from_slice(&sim_state().calib_tp),
            REG_CALIB_H => out.copy_from_slice(&sim_state().calib_h),
            REG_DATA => out.copy_from_slice(&sim_state().burst),
            _ => {
                warn!("bme280 sim: unknown register {reg:#x}");
                return Err(SensorError::NotResponding);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_delay_ms(&self, _ms: u32) {}
}

#[cfg(not(target_os = "espidf"))]
static SIM_FAIL: AtomicBool = AtomicBool::new(false);

#[cfg(not(target_os = "espidf"))]
#[derive(Clone, Copy)]
struct SimState {
    calib_tp: [u8; 26],
    calib_h: [u8; 7],
    burst: [u8; 8],
}

#[cfg(not(target_os = "espidf"))]
static SIM_STATE: Mutex<Option<SimState>> = Mutex::new(None);

#[cfg(not(target_os = "espidf"))]
fn sim_state() -> SimState {
    SIM_STATE.lock().unwrap().unwrap_or(SimState {
        calib_tp: [0; 26],
        calib_h: [0; 7],
        burst: [0; 8],
    })
}

/// Inject raw register contents for host tests.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_registers(calib_tp: [u8; 26], calib_h: [u8; 7], burst: [u8; 8]) {
    *SIM_STATE.lock().unwrap() = Some(SimState {
        calib_tp,
        calib_h,
        burst,
    });
}

/// Make every simulated I2C transaction fail.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_fail(fail: bool) {
    SIM_FAIL.store(fail, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Datasheet section 8.1 worked example trim values.
    fn datasheet_calib() -> Calibration {
        let mut c = Calibration::new();
        c.dig_t1 = 27504;
        c.dig_t2 = 26435;
        c.dig_t3 = -1000;
        c.dig_p1 = 36477;
        c.dig_p2 = -10685;
        c.dig_p3 = 3024;
        c.dig_p4 = 2855;
        c.dig_p5 = 140;
        c.dig_p6 = -7;
        c.dig_p7 = 15500;
        c.dig_p8 = -14600;
        c.dig_p9 = 6000;
        c.loaded = 1;
        c
    }

    #[test]
    fn datasheet_temperature_example() {
        let c = datasheet_calib();
        let t_fine = c.t_fine(519_888);
        let t = Calibration::temperature_c(t_fine);
        assert!((t - 25.08).abs() < 0.01, "got {t}");
    }

    #[test]
    fn datasheet_pressure_example() {
        let c = datasheet_calib();
        let t_fine = c.t_fine(519_888);
        let p = c.pressure_hpa(t_fine, 415_148);
        assert!((p - 1006.5).abs() < 0.1, "got {p}");
    }

    #[test]
    fn burst_unpacking() {
        // Pressure 0x6CA95, temperature 0x7E5D0, humidity 0x6B2A.
        let data = [0x6C, 0xA9, 0x50, 0x7E, 0x5D, 0x00, 0x6B, 0x2A];
        let (adc_p, adc_t, adc_h) = unpack_burst(&data);
        assert_eq!(adc_p, 0x6CA95);
        assert_eq!(adc_t, 0x7E5D0);
        assert_eq!(adc_h, 0x6B2A);
    }

    #[test]
    fn h4_h5_nibble_packing() {
        let mut c = Calibration::new();
        let mut tp = [0u8; 26];
        tp[25] = 0x4B; // H1
        // H4 = 0x123 (reg 0xE4=0x12, low nibble of 0xE5=0x3),
        // H5 = 0x456 (high nibble of 0xE5=0x6... packed per datasheet).
        let h = [0x00, 0x01, 0x00, 0x12, 0x63, 0x45, 0x1E];
        c.parse(&tp, &h);
        assert!(c.is_loaded());
        assert_eq!(c.dig_h1, 0x4B);
        assert_eq!(c.dig_h4, (0x12 << 4) | 0x03);
        assert_eq!(c.dig_h5, 0x6 | (0x45 << 4));
        assert_eq!(c.dig_h6, 0x1E);
    }

    #[test]
    fn calibration_loads_once_via_sim() {
        sim_set_fail(false);
        let mut tp = [0u8; 26];
        tp[0] = 0x70;
        tp[1] = 0x6B; // dig_T1 = 27504
        sim_set_registers(tp, [0u8; 7], [0u8; 8]);
        let mut calib = Calibration::new();
        let mut sensor = Bme280Sensor::new(0x76);
        let _ = sensor.read(&mut calib).unwrap();
        assert!(calib.is_loaded());
        assert_eq!(calib.dig_t1, 27504);
    }
}
