//! Sensirion SHT40/41/45 humidity and temperature sensor. Single shot, every
//! sample is requested and read back after the conversion time.

use std::time::Duration;

use i2c_bus::I2cDevice;
use protocol::{Measure, Measurement};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use super::sensirion::{words, ChecksumLog};
use crate::command::{Command, CommandKind, CommandOutput};
use crate::errors::{Error, SetupError};
use crate::info::{SensorInfo, SensorKind, Setup};
use crate::{Driver, Sensor};

const SOFT_RESET: u8 = 0x94;
const RESET_TIME: Duration = Duration::from_millis(1);

pub static INFO: SensorInfo = SensorInfo {
    kind: SensorKind::Sht4x,
    manufacturer: "Sensirion",
    name: "SHT4x",
    uri: "https://sensirion.com/products/catalog/SHT41",
    default_address: 0x44,
    default_interval: Duration::from_secs(2),
    measures: &[Measure::Temperature, Measure::Humidity],
    dependencies: &[],
    commands: &[CommandKind::SoftReset],
};

pub(crate) fn create(setup: Setup<'_>) -> Result<Sensor, SetupError> {
    let device = setup.open(&INFO)?;
    let address = device.address();
    let precision = setup.settings.precision;
    Ok(setup.into_sensor(&INFO, address, Sht4x::new(device, precision)))
}

/// Repeatability of a measurement, higher takes longer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    #[default]
    High,
    Medium,
    Low,
}

impl Precision {
    fn command(self) -> u8 {
        match self {
            Precision::High => 0xFD,
            Precision::Medium => 0xF6,
            Precision::Low => 0xE0,
        }
    }

    fn conversion_time(self) -> Duration {
        match self {
            Precision::High => Duration::from_millis(10),
            Precision::Medium => Duration::from_millis(5),
            Precision::Low => Duration::from_millis(2),
        }
    }
}

pub struct Sht4x {
    device: I2cDevice,
    precision: Precision,
    checksums: ChecksumLog,
}

impl Sht4x {
    #[must_use]
    pub fn new(device: I2cDevice, precision: Precision) -> Self {
        Self {
            device,
            precision,
            checksums: ChecksumLog::new(),
        }
    }

    /// Temperature in °C and relative humidity, `None` where the checksum
    /// did not match.
    pub async fn measure(&mut self) -> Result<(Option<f32>, Option<f32>), Error> {
        let mut response = [0u8; 6];
        {
            let mut session = self.device.session().await;
            session.write(&[self.precision.command()])?;
            session.settle(self.precision.conversion_time()).await;
            session.read(&mut response)?;
        }

        let mut fields = words(&response);
        let temperature = fields.next().flatten();
        let humidity = fields.next().flatten();
        if temperature.is_none() {
            self.checksums.failed(INFO.name, "temperature");
        }
        if humidity.is_none() {
            self.checksums.failed(INFO.name, "humidity");
        }

        Ok((
            temperature.map(|raw| -45. + 175. * f32::from(raw) / 65535.),
            // the sensor can report slightly outside the physical range
            humidity.map(|raw| (-6. + 125. * f32::from(raw) / 65535.).clamp(0., 100.)),
        ))
    }

    pub async fn soft_reset(&mut self) -> Result<(), Error> {
        self.device.write(&[SOFT_RESET]).await?;
        sleep(RESET_TIME).await;
        Ok(())
    }
}

impl Driver for Sht4x {
    async fn start(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn try_measure(&mut self) -> Result<Vec<Measurement>, Error> {
        let (temperature, humidity) = self.measure().await?;
        Ok([
            temperature.map(Measurement::temperature),
            humidity.map(Measurement::humidity),
        ]
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .collect())
    }

    async fn affect(&mut self, command: Command) -> Result<CommandOutput, Error> {
        match command {
            Command::SoftReset => {
                self.soft_reset().await?;
                Ok(CommandOutput::Done)
            }
            other => Err(Error::UnsupportedCommand(CommandKind::from(&other))),
        }
    }

    async fn stop(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
