//! Sensirion SPS30 particulate matter sensor over I2C, reporting IEEE754
//! floats. Every float is sent as two checksummed words.

use std::time::Duration;

use i2c_bus::I2cDevice;
use protocol::{check_word, Measure, Measurement, ParticleSize};
use tokio::time::sleep;
use tracing::instrument;

use super::sensirion::{command, words, ChecksumLog};
use crate::command::{Command, CommandKind, CommandOutput};
use crate::errors::{Error, SetupError};
use crate::info::{SensorInfo, SensorKind, Setup};
use crate::{Driver, Sensor};

const START_MEASUREMENT: u16 = 0x0010;
const STOP_MEASUREMENT: u16 = 0x0104;
const DATA_READY: u16 = 0x0202;
const READ_VALUES: u16 = 0x0300;
const START_FAN_CLEANING: u16 = 0x5607;

/// Output format argument of the start command: big-endian floats
const FLOAT_OUTPUT: u16 = 0x0300;
const COMMAND_TIME: Duration = Duration::from_millis(20);

const MASS: [ParticleSize; 4] = [
    ParticleSize::Pm1_0,
    ParticleSize::Pm2_5,
    ParticleSize::Pm4_0,
    ParticleSize::Pm10,
];
const NUMBER: [ParticleSize; 5] = [
    ParticleSize::Pm0_5,
    ParticleSize::Pm1_0,
    ParticleSize::Pm2_5,
    ParticleSize::Pm4_0,
    ParticleSize::Pm10,
];

pub static INFO: SensorInfo = SensorInfo {
    kind: SensorKind::Sps30,
    manufacturer: "Sensirion",
    name: "SPS30",
    uri: "https://sensirion.com/products/catalog/SPS30",
    default_address: 0x69,
    default_interval: Duration::from_secs(1),
    measures: &[
        Measure::ParticulateMass(ParticleSize::Pm1_0),
        Measure::ParticulateMass(ParticleSize::Pm2_5),
        Measure::ParticulateMass(ParticleSize::Pm4_0),
        Measure::ParticulateMass(ParticleSize::Pm10),
        Measure::ParticulateNumber(ParticleSize::Pm0_5),
        Measure::ParticulateNumber(ParticleSize::Pm1_0),
        Measure::ParticulateNumber(ParticleSize::Pm2_5),
        Measure::ParticulateNumber(ParticleSize::Pm4_0),
        Measure::ParticulateNumber(ParticleSize::Pm10),
    ],
    dependencies: &[],
    commands: &[CommandKind::StartFanCleaning],
};

pub(crate) fn create(setup: Setup<'_>) -> Result<Sensor, SetupError> {
    let device = setup.open(&INFO)?;
    let address = device.address();
    Ok(setup.into_sensor(&INFO, address, Sps30::new(device)))
}

/// Ten floats: mass concentration PM1.0 to PM10 in µg/m³, number
/// concentration PM0.5 to PM10 in #/cm³ and the typical particle size.
/// A float is `None` if either of its words failed the checksum.
fn decode_floats(response: &[u8; 60]) -> [Option<f32>; 10] {
    let words: Vec<_> = words(response).collect();
    let mut floats = [None; 10];
    for (float, pair) in floats.iter_mut().zip(words.chunks_exact(2)) {
        if let [Some(hi), Some(lo)] = pair {
            *float = Some(f32::from_bits((u32::from(*hi) << 16) | u32::from(*lo)));
        }
    }
    floats
}

pub struct Sps30 {
    device: I2cDevice,
    measuring: bool,
    checksums: ChecksumLog,
}

impl Sps30 {
    #[must_use]
    pub fn new(device: I2cDevice) -> Self {
        Self {
            device,
            measuring: false,
            checksums: ChecksumLog::new(),
        }
    }

    #[instrument(skip_all)]
    pub async fn start_measurement(&mut self) -> Result<(), Error> {
        let [c0, c1] = command(START_MEASUREMENT);
        let [a0, a1, crc] = protocol::word_with_crc(FLOAT_OUTPUT);
        self.device.write(&[c0, c1, a0, a1, crc]).await?;
        self.measuring = true;
        sleep(COMMAND_TIME).await;
        Ok(())
    }

    pub async fn stop_measurement(&mut self) -> Result<(), Error> {
        self.device.write(&command(STOP_MEASUREMENT)).await?;
        self.measuring = false;
        sleep(COMMAND_TIME).await;
        Ok(())
    }

    pub async fn data_ready(&mut self) -> Result<bool, Error> {
        let mut response = [0u8; 3];
        self.device
            .write_read(&command(DATA_READY), &mut response)
            .await?;
        match check_word(&response) {
            Some(flag) => Ok(flag & 0x1 == 1),
            None => {
                self.checksums.failed(INFO.name, "data ready flag");
                Ok(false)
            }
        }
    }

    pub async fn read_values(&mut self) -> Result<Vec<Measurement>, Error> {
        let mut response = [0u8; 60];
        self.device
            .write_read(&command(READ_VALUES), &mut response)
            .await?;

        let floats = decode_floats(&response);
        let mass = MASS
            .iter()
            .zip(&floats[0..4])
            .map(|(size, v)| v.map(|v| (Measure::ParticulateMass(*size), v)));
        let number = NUMBER
            .iter()
            .zip(&floats[4..9])
            .map(|(size, v)| v.map(|v| (Measure::ParticulateNumber(*size), v)));

        let mut measurements = Vec::with_capacity(9);
        for field in mass.chain(number) {
            match field {
                Some((measure, value)) => {
                    if let Ok(m) = Measurement::in_native_unit(measure, value) {
                        measurements.push(m);
                    }
                }
                None => self.checksums.failed(INFO.name, "concentration"),
            }
        }
        Ok(measurements)
    }

    pub async fn start_fan_cleaning(&mut self) -> Result<(), Error> {
        if !self.measuring {
            return Err(Error::WrongState("measuring"));
        }
        self.device.write(&command(START_FAN_CLEANING)).await?;
        sleep(COMMAND_TIME).await;
        Ok(())
    }
}

impl Driver for Sps30 {
    async fn start(&mut self) -> Result<(), Error> {
        self.start_measurement().await
    }

    async fn try_measure(&mut self) -> Result<Vec<Measurement>, Error> {
        if !self.data_ready().await? {
            return Ok(Vec::new());
        }
        self.read_values().await
    }

    async fn affect(&mut self, command: Command) -> Result<CommandOutput, Error> {
        match command {
            Command::StartFanCleaning => {
                self.start_fan_cleaning().await?;
                Ok(CommandOutput::Done)
            }
            other => Err(Error::UnsupportedCommand(CommandKind::from(&other))),
        }
    }

    async fn stop(&mut self) -> Result<(), Error> {
        if self.measuring {
            self.stop_measurement().await?;
        }
        Ok(())
    }
}
