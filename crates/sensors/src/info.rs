use std::sync::Arc;
use std::time::Duration;

use i2c_bus::{Address, I2cBus, I2cDevice};
use protocol::{Measure, SensorDependency};
use serde::{Deserialize, Serialize};

use crate::command::CommandKind;
use crate::drivers::{self, Precision};
use crate::errors::SetupError;
use crate::input::Inputs;
use crate::{Driver, Sensor};

/// Turns a raw VOC signal into the VOC index. Arguments are the raw ticks
/// and the humidity (%RH) and temperature (°C) used for compensation, if
/// known.
///
/// The index algorithm keeps state between calls, plug in an
/// implementation of Sensirion's gas index algorithm.
pub type VocIndexFn = Arc<dyn Fn(u16, Option<f32>, Option<f32>) -> f32 + Send + Sync>;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantArray,
)]
pub enum SensorKind {
    Scd4x,
    Sht4x,
    Bmp280,
    Sgp40,
    Sps30,
}

/// Static description of a kind of sensor.
#[derive(Debug)]
pub struct SensorInfo {
    pub kind: SensorKind,
    pub manufacturer: &'static str,
    pub name: &'static str,
    /// Product page
    pub uri: &'static str,
    pub default_address: u8,
    pub default_interval: Duration,
    pub measures: &'static [Measure],
    pub dependencies: &'static [SensorDependency],
    pub commands: &'static [CommandKind],
}

impl SensorKind {
    #[must_use]
    pub const fn info(&self) -> &'static SensorInfo {
        match self {
            SensorKind::Scd4x => &drivers::scd4x::INFO,
            SensorKind::Sht4x => &drivers::sht4x::INFO,
            SensorKind::Bmp280 => &drivers::bmp280::INFO,
            SensorKind::Sgp40 => &drivers::sgp40::INFO,
            SensorKind::Sps30 => &drivers::sps30::INFO,
        }
    }

    /// Opens the device and sets up the sensor, without touching the
    /// hardware.
    ///
    /// # Errors
    /// The device could not be opened or a needed input is missing.
    pub fn create(&self, setup: Setup<'_>) -> Result<Sensor, SetupError> {
        match self {
            SensorKind::Scd4x => drivers::scd4x::create(setup),
            SensorKind::Sht4x => drivers::sht4x::create(setup),
            SensorKind::Bmp280 => drivers::bmp280::create(setup),
            SensorKind::Sgp40 => drivers::sgp40::create(setup),
            SensorKind::Sps30 => drivers::sps30::create(setup),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Settings {
    /// Time between samples, the sensor's default if `None`
    pub interval: Option<Duration>,
    /// Only used by sensors with a configurable repeatability
    pub precision: Precision,
}

/// Everything needed to create a sensor.
pub struct Setup<'a> {
    pub bus: &'a I2cBus,
    /// The sensor's default address if `None`
    pub address: Option<Address>,
    pub settings: Settings,
    pub inputs: Inputs,
    pub voc_index: Option<VocIndexFn>,
}

impl<'a> Setup<'a> {
    #[must_use]
    pub fn new(bus: &'a I2cBus) -> Self {
        Self {
            bus,
            address: None,
            settings: Settings::default(),
            inputs: Inputs::none(),
            voc_index: None,
        }
    }

    pub(crate) fn open(&self, info: &SensorInfo) -> Result<I2cDevice, SetupError> {
        let address = match self.address {
            Some(address) => address,
            None => Address::seven_bit(info.default_address)?,
        };
        Ok(self.bus.open_device(address)?)
    }

    pub(crate) fn into_sensor(
        self,
        info: &'static SensorInfo,
        address: Address,
        driver: impl Driver,
    ) -> Sensor {
        let name = format!("{}@{}:{address}", info.name, self.bus.name());
        let interval = self.settings.interval.unwrap_or(info.default_interval);
        Sensor::new(info, name, driver, interval, self.inputs.links)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::VariantArray;

    use super::*;

    #[test]
    fn every_info_matches_its_kind() {
        for kind in SensorKind::VARIANTS {
            let info = kind.info();
            assert_eq!(info.kind, *kind);
            assert!(!info.measures.is_empty());
            assert!(Address::seven_bit(info.default_address).is_ok());
            for dependency in info.dependencies {
                assert!(
                    !info.measures.contains(&dependency.measure),
                    "{kind} depends on itself"
                );
            }
        }
    }

    #[test]
    fn parse_kind() {
        assert_eq!(SensorKind::from_str("Scd4x").unwrap(), SensorKind::Scd4x);
        assert!(SensorKind::from_str("Bme680").is_err());
    }
}
