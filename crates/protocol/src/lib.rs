#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

use core::fmt::Display;

use serde::{Deserialize, Serialize};

mod crc;
mod dependency;
mod measure;
mod measurement;

pub use crc::{check_word, crc8, word_with_crc};
pub use dependency::SensorDependency;
pub use measure::{Measure, ParticleSize};
pub use measurement::{Measurement, Quantity, UnitMismatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Pa,
    C,
    RH,
    Ppm,
    MicrogramPerM3,
    NumberPerCm3,
    /// dimensionless index, VOC and air quality
    Index,
}

impl Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Unit::Pa => f.write_str("Pa"),
            Unit::C => f.write_str("°C"),
            Unit::RH => f.write_str("%RH"),
            Unit::Ppm => f.write_str("ppm"),
            Unit::MicrogramPerM3 => f.write_str("µg/m³"),
            Unit::NumberPerCm3 => f.write_str("#/cm³"),
            Unit::Index => f.write_str(""),
        }
    }
}
