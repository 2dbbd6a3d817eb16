//! Sensirion SCD40/SCD41 photoacoustic CO₂ sensor, in periodic measurement
//! mode. A new sample is ready every 5 seconds.

use std::time::Duration;

use i2c_bus::I2cDevice;
use protocol::{check_word, Measure, Measurement, SensorDependency};
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use super::sensirion::{command, command_with_arg, words, ChecksumLog};
use crate::command::{Command, CommandKind, CommandOutput};
use crate::errors::{Error, SetupError};
use crate::info::{SensorInfo, SensorKind, Setup};
use crate::input::Input;
use crate::{Driver, Sensor};

const START_PERIODIC: u16 = 0x21B1;
const READ_MEASUREMENT: u16 = 0xEC05;
const STOP_PERIODIC: u16 = 0x3F86;
const DATA_READY: u16 = 0xE4B8;
const SET_AMBIENT_PRESSURE: u16 = 0xE000;
const SET_TEMPERATURE_OFFSET: u16 = 0x241D;
const FORCED_RECALIBRATION: u16 = 0x362F;

const COMMAND_TIME: Duration = Duration::from_millis(1);
const STOP_TIME: Duration = Duration::from_millis(500);
const RECALIBRATION_TIME: Duration = Duration::from_millis(400);

const RECALIBRATION_FAILED: u16 = 0xFFFF;

pub static INFO: SensorInfo = SensorInfo {
    kind: SensorKind::Scd4x,
    manufacturer: "Sensirion",
    name: "SCD4x",
    uri: "https://sensirion.com/products/catalog/SCD41",
    default_address: 0x62,
    default_interval: Duration::from_secs(5),
    measures: &[Measure::Co2, Measure::Temperature, Measure::Humidity],
    dependencies: &[SensorDependency::optional(Measure::BarometricPressure)],
    commands: &[
        CommandKind::ForcedRecalibration,
        CommandKind::SetTemperatureOffset,
    ],
};

pub(crate) fn create(mut setup: Setup<'_>) -> Result<Sensor, SetupError> {
    let device = setup.open(&INFO)?;
    let address = device.address();
    let pressure = setup.inputs.take(Measure::BarometricPressure);
    Ok(setup.into_sensor(&INFO, address, Scd4x::new(device, pressure)))
}

fn temperature_offset_ticks(celsius: f32) -> Result<u16, Error> {
    if !(0.0..175.0).contains(&celsius) {
        return Err(Error::InvalidParameter {
            parameter: "temperature offset",
            value: celsius,
            allowed: "0 up to 175 °C",
        });
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok((celsius * 65535. / 175.) as u16)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Measuring,
}

/// Decoded sample, fields that failed their checksum are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub co2: Option<f32>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
}

impl Reading {
    fn measurements(self) -> Vec<Measurement> {
        [
            self.co2.map(Measurement::co2),
            self.temperature.map(Measurement::temperature),
            self.humidity.map(Measurement::humidity),
        ]
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .collect()
    }
}

pub struct Scd4x {
    device: I2cDevice,
    mode: Mode,
    pressure: Input,
    checksums: ChecksumLog,
}

impl Scd4x {
    #[must_use]
    pub fn new(device: I2cDevice, pressure: Input) -> Self {
        Self {
            device,
            mode: Mode::Idle,
            pressure,
            checksums: ChecksumLog::new(),
        }
    }

    pub async fn start_periodic_measurement(&mut self) -> Result<(), Error> {
        self.device.write(&command(START_PERIODIC)).await?;
        self.mode = Mode::Measuring;
        Ok(())
    }

    /// The sensor ignores most commands for 500ms after this, we wait that
    /// out without holding the bus.
    pub async fn stop_periodic_measurement(&mut self) -> Result<(), Error> {
        self.device.write(&command(STOP_PERIODIC)).await?;
        self.mode = Mode::Idle;
        sleep(STOP_TIME).await;
        Ok(())
    }

    /// A corrupt status word reads as not ready.
    pub async fn data_ready(&mut self) -> Result<bool, Error> {
        let mut response = [0u8; 3];
        {
            let mut session = self.device.session().await;
            session.write(&command(DATA_READY))?;
            session.settle(COMMAND_TIME).await;
            session.read(&mut response)?;
        }
        match check_word(&response) {
            Some(status) => Ok(status & 0x07FF != 0),
            None => {
                self.checksums.failed(INFO.name, "data ready status");
                Ok(false)
            }
        }
    }

    pub async fn read_measurement(&mut self) -> Result<Reading, Error> {
        let mut response = [0u8; 9];
        {
            let mut session = self.device.session().await;
            session.write(&command(READ_MEASUREMENT))?;
            session.settle(COMMAND_TIME).await;
            session.read(&mut response)?;
        }

        let mut fields = words(&response);
        let mut next = |field| {
            let word = fields.next().flatten();
            if word.is_none() {
                self.checksums.failed(INFO.name, field);
            }
            word
        };
        Ok(Reading {
            co2: next("co2").map(f32::from),
            temperature: next("temperature").map(|raw| -45. + 175. * f32::from(raw) / 65535.),
            humidity: next("humidity").map(|raw| 100. * f32::from(raw) / 65535.),
        })
    }

    /// Ambient pressure compensation, only accepted while measuring.
    /// Sent in whole hectopascal.
    pub async fn set_ambient_pressure(&mut self, pascal: f32) -> Result<(), Error> {
        if self.mode != Mode::Measuring {
            return Err(Error::WrongState("measuring"));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let hpa = (pascal / 100.).clamp(0., f32::from(u16::MAX)) as u16;
        self.device
            .write(&command_with_arg(SET_AMBIENT_PRESSURE, hpa))
            .await?;
        Ok(())
    }

    /// Only accepted while idle. The sensor can only lower its reading, the
    /// offset is subtracted.
    pub async fn set_temperature_offset(&mut self, celsius: f32) -> Result<(), Error> {
        let raw = temperature_offset_ticks(celsius)?;
        if self.mode != Mode::Idle {
            return Err(Error::WrongState("idle"));
        }
        self.device
            .write(&command_with_arg(SET_TEMPERATURE_OFFSET, raw))
            .await?;
        sleep(COMMAND_TIME).await;
        Ok(())
    }

    /// Only accepted while idle, and only useful after the sensor measured
    /// for a few minutes in air with a known concentration. Returns the
    /// correction applied in ppm.
    pub async fn forced_recalibration(&mut self, target_ppm: u16) -> Result<i32, Error> {
        if self.mode != Mode::Idle {
            return Err(Error::WrongState("idle"));
        }
        let mut response = [0u8; 3];
        {
            let mut session = self.device.session().await;
            session.write(&command_with_arg(FORCED_RECALIBRATION, target_ppm))?;
            session.settle(RECALIBRATION_TIME).await;
            session.read(&mut response)?;
        }
        match check_word(&response) {
            None => Err(Error::CorruptResponse),
            Some(RECALIBRATION_FAILED) => Err(Error::RecalibrationFailed),
            Some(raw) => Ok(i32::from(raw) - 0x8000),
        }
    }

    fn pressure_update(&mut self) -> Option<f32> {
        self.pressure.take_new().map(|m| m.value())
    }
}

impl Driver for Scd4x {
    #[instrument(skip_all)]
    async fn start(&mut self) -> Result<(), Error> {
        // might still be measuring from before we got restarted
        self.stop_periodic_measurement().await?;
        self.start_periodic_measurement().await?;
        if !self.pressure.is_available() {
            info!("no barometer, pressure compensation stays at its default");
        }
        Ok(())
    }

    async fn try_measure(&mut self) -> Result<Vec<Measurement>, Error> {
        if let Some(pascal) = self.pressure_update() {
            debug!("compensating for ambient pressure: {pascal} Pa");
            self.set_ambient_pressure(pascal).await?;
        }
        if !self.data_ready().await? {
            return Ok(Vec::new());
        }
        Ok(self.read_measurement().await?.measurements())
    }

    async fn affect(&mut self, command: Command) -> Result<CommandOutput, Error> {
        // refuse before interrupting the measurements
        if let Command::SetTemperatureOffset { celsius } = command {
            temperature_offset_ticks(celsius)?;
        }
        self.stop_periodic_measurement().await?;
        let res = match command {
            Command::ForcedRecalibration { target_ppm } => self
                .forced_recalibration(target_ppm)
                .await
                .map(|ppm| CommandOutput::Correction { ppm }),
            Command::SetTemperatureOffset { celsius } => self
                .set_temperature_offset(celsius)
                .await
                .map(|()| CommandOutput::Done),
            other => Err(Error::UnsupportedCommand(CommandKind::from(&other))),
        };
        self.start_periodic_measurement().await?;
        res
    }

    async fn stop(&mut self) -> Result<(), Error> {
        if self.mode == Mode::Measuring {
            self.stop_periodic_measurement().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_offset_range() {
        assert_eq!(temperature_offset_ticks(0.).unwrap(), 0);
        assert_eq!(temperature_offset_ticks(4.).unwrap(), 1497);
        for bad in [-0.5, 175., f32::NAN] {
            assert!(matches!(
                temperature_offset_ticks(bad),
                Err(Error::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn reading_skips_missing() {
        let reading = Reading {
            co2: Some(600.),
            temperature: None,
            humidity: Some(45.),
        };
        let measures: Vec<_> = reading
            .measurements()
            .iter()
            .map(Measurement::measure)
            .collect();
        assert_eq!(measures, [Measure::Co2, Measure::Humidity]);
    }
}
