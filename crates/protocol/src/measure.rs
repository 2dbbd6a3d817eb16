use core::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::Unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticleSize {
    Pm0_5,
    Pm1_0,
    Pm2_5,
    Pm4_0,
    Pm10,
}

impl Display for ParticleSize {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParticleSize::Pm0_5 => f.write_str("PM0.5"),
            ParticleSize::Pm1_0 => f.write_str("PM1.0"),
            ParticleSize::Pm2_5 => f.write_str("PM2.5"),
            ParticleSize::Pm4_0 => f.write_str("PM4.0"),
            ParticleSize::Pm10 => f.write_str("PM10"),
        }
    }
}

/// The kind of quantity a measurement carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    Humidity,
    Temperature,
    Co2,
    Voc,
    BarometricPressure,
    ParticulateMass(ParticleSize),
    ParticulateNumber(ParticleSize),
    /// Derived from other measures, never read from hardware directly
    AirQualityIndex,
}

impl Measure {
    #[must_use]
    pub const fn unit(&self) -> Unit {
        match self {
            Measure::Humidity => Unit::RH,
            Measure::Temperature => Unit::C,
            Measure::Co2 => Unit::Ppm,
            Measure::Voc => Unit::Index,
            Measure::BarometricPressure => Unit::Pa,
            Measure::ParticulateMass(_) => Unit::MicrogramPerM3,
            Measure::ParticulateNumber(_) => Unit::NumberPerCm3,
            Measure::AirQualityIndex => Unit::Index,
        }
    }
}

impl Display for Measure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Measure::Humidity => f.write_str("Humidity"),
            Measure::Temperature => f.write_str("Temperature"),
            Measure::Co2 => f.write_str("CO₂"),
            Measure::Voc => f.write_str("VOC index"),
            Measure::BarometricPressure => f.write_str("Pressure"),
            Measure::ParticulateMass(size) => write!(f, "{size} mass"),
            Measure::ParticulateNumber(size) => write!(f, "{size} count"),
            Measure::AirQualityIndex => f.write_str("AQI"),
        }
    }
}
