use core::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{Measure, ParticleSize, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f32,
    pub unit: Unit,
}

impl Quantity {
    #[must_use]
    pub const fn new(value: f32, unit: Unit) -> Self {
        Self { value, unit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum UnitMismatch {
    #[error("{measure} is expressed in {expected}, got a value in {got}")]
    Unit {
        measure: Measure,
        expected: Unit,
        got: Unit,
    },
    #[error("{measure} value is not a finite number: {value}")]
    NotFinite { measure: Measure, value: f32 },
}

/// One reading of one measure.
///
/// The unit always matches the measure, that is checked when the
/// measurement is made. There is no way to change it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    measure: Measure,
    value: Quantity,
}

impl Measurement {
    pub fn new(measure: Measure, value: Quantity) -> Result<Self, UnitMismatch> {
        if value.unit != measure.unit() {
            return Err(UnitMismatch::Unit {
                measure,
                expected: measure.unit(),
                got: value.unit,
            });
        }
        if !value.value.is_finite() {
            return Err(UnitMismatch::NotFinite {
                measure,
                value: value.value,
            });
        }
        Ok(Self { measure, value })
    }

    /// Pairs the value with the unit `measure` is expressed in.
    pub fn in_native_unit(measure: Measure, value: f32) -> Result<Self, UnitMismatch> {
        Self::new(measure, Quantity::new(value, measure.unit()))
    }

    pub fn temperature(celsius: f32) -> Result<Self, UnitMismatch> {
        Self::in_native_unit(Measure::Temperature, celsius)
    }

    pub fn humidity(relative_humidity: f32) -> Result<Self, UnitMismatch> {
        Self::in_native_unit(Measure::Humidity, relative_humidity)
    }

    pub fn pressure(pascal: f32) -> Result<Self, UnitMismatch> {
        Self::in_native_unit(Measure::BarometricPressure, pascal)
    }

    pub fn co2(ppm: f32) -> Result<Self, UnitMismatch> {
        Self::in_native_unit(Measure::Co2, ppm)
    }

    pub fn voc_index(index: f32) -> Result<Self, UnitMismatch> {
        Self::in_native_unit(Measure::Voc, index)
    }

    pub fn particulate_mass(size: ParticleSize, ug_per_m3: f32) -> Result<Self, UnitMismatch> {
        Self::in_native_unit(Measure::ParticulateMass(size), ug_per_m3)
    }

    pub fn particulate_number(size: ParticleSize, per_cm3: f32) -> Result<Self, UnitMismatch> {
        Self::in_native_unit(Measure::ParticulateNumber(size), per_cm3)
    }

    #[must_use]
    pub fn measure(&self) -> Measure {
        self.measure
    }

    #[must_use]
    pub fn quantity(&self) -> Quantity {
        self.value
    }

    #[must_use]
    pub fn value(&self) -> f32 {
        self.value.value
    }

    #[must_use]
    pub fn unit(&self) -> Unit {
        self.value.unit
    }
}

impl Display for Measurement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.unit() {
            Unit::Index => write!(f, "{}: {:.0}", self.measure, self.value()),
            unit => write!(f, "{}: {:.1} {unit}", self.measure, self.value()),
        }
    }
}

impl<'de> Deserialize<'de> for Measurement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            measure: Measure,
            value: Quantity,
        }

        let Raw { measure, value } = Raw::deserialize(deserializer)?;
        Measurement::new(measure, value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_must_match_measure() {
        let err = Measurement::new(Measure::Temperature, Quantity::new(20.0, Unit::Pa))
            .unwrap_err();
        assert_eq!(
            err,
            UnitMismatch::Unit {
                measure: Measure::Temperature,
                expected: Unit::C,
                got: Unit::Pa,
            }
        );
    }

    #[test]
    fn rejects_nan() {
        assert!(Measurement::co2(f32::NAN).is_err());
        assert!(Measurement::pressure(f32::INFINITY).is_err());
    }

    #[test]
    fn constructors_pick_the_right_unit() {
        let m = Measurement::particulate_number(ParticleSize::Pm2_5, 12.0).unwrap();
        assert_eq!(m.unit(), Unit::NumberPerCm3);
        assert_eq!(m.measure(), Measure::ParticulateNumber(ParticleSize::Pm2_5));
        assert_eq!(Measurement::pressure(101_325.0).unwrap().unit(), Unit::Pa);
    }

    #[test]
    fn display() {
        let m = Measurement::temperature(21.34).unwrap();
        assert_eq!(m.to_string(), "Temperature: 21.3 °C");
        let m = Measurement::voc_index(101.0).unwrap();
        assert_eq!(m.to_string(), "VOC index: 101");
    }
}
