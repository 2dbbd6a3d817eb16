//! Sensirion SGP40 metal oxide VOC sensor. The raw signal needs humidity and
//! temperature compensation, those come from another sensor when available.

use std::time::Duration;

use i2c_bus::I2cDevice;
use protocol::{check_word, word_with_crc, Measure, Measurement, SensorDependency};
use tracing::{debug, warn};

use super::sensirion::{command, ChecksumLog};
use crate::command::{Command, CommandKind, CommandOutput};
use crate::errors::{Error, SetupError};
use crate::info::{SensorInfo, SensorKind, Setup, VocIndexFn};
use crate::input::Input;
use crate::{Driver, Sensor};

const MEASURE_RAW: u16 = 0x260F;
const HEATER_OFF: u16 = 0x3615;
const SELF_TEST: u16 = 0x280E;

const MEASURE_TIME: Duration = Duration::from_millis(30);
const SELF_TEST_TIME: Duration = Duration::from_millis(320);
const SELF_TEST_PASSED: u16 = 0xD400;

/// Compensation values that turn compensation off, 50 %RH and 25 °C
const DEFAULT_HUMIDITY: u16 = 0x8000;
const DEFAULT_TEMPERATURE: u16 = 0x6666;

pub static INFO: SensorInfo = SensorInfo {
    kind: SensorKind::Sgp40,
    manufacturer: "Sensirion",
    name: "SGP40",
    uri: "https://sensirion.com/products/catalog/SGP40",
    default_address: 0x59,
    default_interval: Duration::from_secs(1),
    measures: &[Measure::Voc],
    dependencies: &[
        SensorDependency::optional(Measure::Humidity),
        SensorDependency::optional(Measure::Temperature),
    ],
    commands: &[CommandKind::SelfTest],
};

pub(crate) fn create(mut setup: Setup<'_>) -> Result<Sensor, SetupError> {
    let voc_index = setup
        .voc_index
        .clone()
        .ok_or(SetupError::MissingVocAlgorithm(INFO.name))?;
    let device = setup.open(&INFO)?;
    let address = device.address();
    let humidity = setup.inputs.take(Measure::Humidity);
    let temperature = setup.inputs.take(Measure::Temperature);
    let driver = Sgp40::new(device, humidity, temperature, voc_index);
    Ok(setup.into_sensor(&INFO, address, driver))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn humidity_ticks(relative_humidity: f32) -> u16 {
    (relative_humidity.clamp(0., 100.) * 65535. / 100.) as u16
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn temperature_ticks(celsius: f32) -> u16 {
    ((celsius.clamp(-45., 130.) + 45.) * 65535. / 175.) as u16
}

fn measure_raw_command(humidity: u16, temperature: u16) -> [u8; 8] {
    let mut cmd = [0u8; 8];
    cmd[..2].copy_from_slice(&command(MEASURE_RAW));
    cmd[2..5].copy_from_slice(&word_with_crc(humidity));
    cmd[5..].copy_from_slice(&word_with_crc(temperature));
    cmd
}

pub struct Sgp40 {
    device: I2cDevice,
    humidity: Input,
    temperature: Input,
    voc_index: VocIndexFn,
    heating: bool,
    checksums: ChecksumLog,
}

impl Sgp40 {
    #[must_use]
    pub fn new(
        device: I2cDevice,
        humidity: Input,
        temperature: Input,
        voc_index: VocIndexFn,
    ) -> Self {
        Self {
            device,
            humidity,
            temperature,
            voc_index,
            heating: false,
            checksums: ChecksumLog::new(),
        }
    }

    /// Raw signal in ticks, `None` if the response failed its checksum.
    /// Leaves the hotplate heating.
    pub async fn measure_raw(
        &mut self,
        relative_humidity: Option<f32>,
        celsius: Option<f32>,
    ) -> Result<Option<u16>, Error> {
        let cmd = measure_raw_command(
            relative_humidity.map_or(DEFAULT_HUMIDITY, humidity_ticks),
            celsius.map_or(DEFAULT_TEMPERATURE, temperature_ticks),
        );
        let mut response = [0u8; 3];
        {
            let mut session = self.device.session().await;
            session.write(&cmd)?;
            self.heating = true;
            session.settle(MEASURE_TIME).await;
            session.read(&mut response)?;
        }
        let raw = check_word(&response);
        if raw.is_none() {
            self.checksums.failed(INFO.name, "raw signal");
        }
        Ok(raw)
    }

    pub async fn heater_off(&mut self) -> Result<(), Error> {
        self.device.write(&command(HEATER_OFF)).await?;
        self.heating = false;
        Ok(())
    }

    pub async fn self_test(&mut self) -> Result<(), Error> {
        let mut response = [0u8; 3];
        {
            let mut session = self.device.session().await;
            session.write(&command(SELF_TEST))?;
            session.settle(SELF_TEST_TIME).await;
            session.read(&mut response)?;
        }
        match check_word(&response) {
            Some(SELF_TEST_PASSED) => Ok(()),
            Some(result) => Err(Error::SelfTest(result)),
            None => Err(Error::CorruptResponse),
        }
    }
}

impl Driver for Sgp40 {
    async fn start(&mut self) -> Result<(), Error> {
        if !self.humidity.is_available() || !self.temperature.is_available() {
            debug!("running without full humidity/temperature compensation");
        }
        Ok(())
    }

    async fn try_measure(&mut self) -> Result<Vec<Measurement>, Error> {
        let relative_humidity = self.humidity.latest().map(|m| m.value());
        let celsius = self.temperature.latest().map(|m| m.value());
        let Some(raw) = self.measure_raw(relative_humidity, celsius).await? else {
            return Ok(Vec::new());
        };

        let index = (self.voc_index)(raw, relative_humidity, celsius);
        match Measurement::voc_index(index) {
            Ok(measurement) => Ok(vec![measurement]),
            Err(err) => {
                warn!("VOC algorithm gave an unusable index: {err}");
                Ok(Vec::new())
            }
        }
    }

    async fn affect(&mut self, command: Command) -> Result<CommandOutput, Error> {
        match command {
            Command::SelfTest => {
                self.self_test().await?;
                Ok(CommandOutput::Done)
            }
            other => Err(Error::UnsupportedCommand(CommandKind::from(&other))),
        }
    }

    async fn stop(&mut self) -> Result<(), Error> {
        if self.heating {
            self.heater_off().await?;
        }
        Ok(())
    }
}
