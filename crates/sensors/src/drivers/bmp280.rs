//! Bosch BMP280 barometer in forced mode: every sample triggers one
//! conversion after which the chip goes back to sleep.
//!
//! The chip has no checksums. Its id and the factory calibration are
//! checked once at start instead.

use std::time::Duration;

use i2c_bus::I2cDevice;
use protocol::{Measure, Measurement};
use tracing::{debug, instrument, warn};

use crate::errors::{Error, SetupError};
use crate::info::{SensorInfo, SensorKind, Setup};
use crate::{Driver, Sensor};

const REG_CALIBRATION: u8 = 0x88;
const REG_CHIP_ID: u8 = 0xD0;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA: u8 = 0xF7;

const CHIP_ID: u8 = 0x58;
/// Temperature oversampling x2, pressure x16, forced mode
const CTRL_FORCED: u8 = 0b010_101_01;
const CTRL_SLEEP: u8 = 0;
/// Worst case conversion time for the oversampling in [`CTRL_FORCED`]
const CONVERSION_TIME: Duration = Duration::from_millis(44);
/// Reported when a conversion was skipped
const SKIPPED: i32 = 0x80000;

pub static INFO: SensorInfo = SensorInfo {
    kind: SensorKind::Bmp280,
    manufacturer: "Bosch",
    name: "BMP280",
    uri: "https://www.bosch-sensortec.com/products/environmental-sensors/pressure-sensors/bmp280",
    default_address: 0x76,
    default_interval: Duration::from_secs(2),
    measures: &[Measure::BarometricPressure, Measure::Temperature],
    dependencies: &[],
    commands: &[],
};

pub(crate) fn create(setup: Setup<'_>) -> Result<Sensor, SetupError> {
    let device = setup.open(&INFO)?;
    let address = device.address();
    Ok(setup.into_sensor(&INFO, address, Bmp280::new(device)))
}

/// Factory trimming parameters, read from the chip once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    t1: u16,
    t2: i16,
    t3: i16,
    p1: u16,
    p2: i16,
    p3: i16,
    p4: i16,
    p5: i16,
    p6: i16,
    p7: i16,
    p8: i16,
    p9: i16,
}

impl Calibration {
    /// # Errors
    /// An unprogrammed (all zero or all ones) calibration
    pub fn parse(raw: &[u8; 24]) -> Result<Self, Error> {
        let u = |i: usize| u16::from_le_bytes([raw[i], raw[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([raw[i], raw[i + 1]]);
        let calibration = Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
        };
        let blank = [0, u16::MAX];
        if blank.contains(&calibration.t1) || blank.contains(&calibration.p1) {
            return Err(Error::Calibration);
        }
        Ok(calibration)
    }

    /// Returns the temperature in °C and the fine temperature the pressure
    /// compensation needs.
    #[must_use]
    pub fn temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc_t = f64::from(adc_t);
        let t1 = f64::from(self.t1);
        let var1 = (adc_t / 16384. - t1 / 1024.) * f64::from(self.t2);
        let var2 = (adc_t / 131_072. - t1 / 8192.).powi(2) * f64::from(self.t3);
        let t_fine = var1 + var2;
        (t_fine / 5120., t_fine)
    }

    /// Pressure in Pa, `None` if the calibration would divide by zero.
    #[must_use]
    pub fn pressure(&self, adc_p: i32, t_fine: f64) -> Option<f64> {
        let mut var1 = t_fine / 2. - 64000.;
        let mut var2 = var1 * var1 * f64::from(self.p6) / 32768.;
        var2 += var1 * f64::from(self.p5) * 2.;
        var2 = var2 / 4. + f64::from(self.p4) * 65536.;
        var1 = (f64::from(self.p3) * var1 * var1 / 524_288. + f64::from(self.p2) * var1) / 524_288.;
        var1 = (1. + var1 / 32768.) * f64::from(self.p1);
        if var1 == 0. {
            return None;
        }
        let mut p = 1_048_576. - f64::from(adc_p);
        p = (p - var2 / 4096.) * 6250. / var1;
        let var1 = f64::from(self.p9) * p * p / 2_147_483_648.;
        let var2 = p * f64::from(self.p8) / 32768.;
        Some(p + (var1 + var2 + f64::from(self.p7)) / 16.)
    }
}

fn adc_value(raw: &[u8]) -> i32 {
    (i32::from(raw[0]) << 12) | (i32::from(raw[1]) << 4) | (i32::from(raw[2]) >> 4)
}

pub struct Bmp280 {
    device: I2cDevice,
    calibration: Option<Calibration>,
}

impl Bmp280 {
    #[must_use]
    pub fn new(device: I2cDevice) -> Self {
        Self {
            device,
            calibration: None,
        }
    }

    /// Checks the chip id and reads the calibration.
    #[instrument(skip_all)]
    pub async fn init(&mut self) -> Result<Calibration, Error> {
        let mut id = [0u8];
        let mut raw = [0u8; 24];
        {
            let mut session = self.device.session().await;
            session.write_read(&[REG_CHIP_ID], &mut id)?;
            if id[0] != CHIP_ID {
                return Err(Error::WrongChip {
                    expected: CHIP_ID,
                    found: id[0],
                });
            }
            session.write_read(&[REG_CALIBRATION], &mut raw)?;
            // no IIR filter, standby time is unused in forced mode
            session.write(&[REG_CONFIG, 0])?;
        }
        let calibration = Calibration::parse(&raw)?;
        debug!("calibration: {calibration:?}");
        self.calibration = Some(calibration);
        Ok(calibration)
    }

    /// Pressure in Pa and temperature in °C. Skipped conversions are `None`.
    pub async fn measure(&mut self) -> Result<(Option<f32>, Option<f32>), Error> {
        let calibration = match self.calibration {
            Some(calibration) => calibration,
            None => self.init().await?,
        };

        let mut raw = [0u8; 6];
        {
            let mut session = self.device.session().await;
            session.write(&[REG_CTRL_MEAS, CTRL_FORCED])?;
            session.settle(CONVERSION_TIME).await;
            session.write_read(&[REG_DATA], &mut raw)?;
        }

        let adc_p = adc_value(&raw[0..3]);
        let adc_t = adc_value(&raw[3..6]);
        if adc_t == SKIPPED {
            warn!("temperature conversion skipped");
            return Ok((None, None));
        }
        let (temperature, t_fine) = calibration.temperature(adc_t);
        let pressure = if adc_p == SKIPPED {
            None
        } else {
            calibration.pressure(adc_p, t_fine)
        };
        #[allow(clippy::cast_possible_truncation)]
        Ok((pressure.map(|p| p as f32), Some(temperature as f32)))
    }
}

impl Driver for Bmp280 {
    async fn start(&mut self) -> Result<(), Error> {
        self.init().await.map(|_| ())
    }

    async fn try_measure(&mut self) -> Result<Vec<Measurement>, Error> {
        let (pressure, temperature) = self.measure().await?;
        Ok([
            pressure.map(Measurement::pressure),
            temperature.map(Measurement::temperature),
        ]
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .collect())
    }

    async fn stop(&mut self) -> Result<(), Error> {
        if self.calibration.is_some() {
            self.device.write(&[REG_CTRL_MEAS, CTRL_SLEEP]).await?;
        }
        Ok(())
    }
}
