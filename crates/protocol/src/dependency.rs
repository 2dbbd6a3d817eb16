use serde::{Deserialize, Serialize};

use crate::Measure;

/// A sensor needs the latest value of another measure, usually to calibrate.
///
/// When `required` is false the sensor runs without it and falls back to
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorDependency {
    pub measure: Measure,
    pub required: bool,
}

impl SensorDependency {
    #[must_use]
    pub const fn optional(measure: Measure) -> Self {
        Self {
            measure,
            required: false,
        }
    }

    #[must_use]
    pub const fn required(measure: Measure) -> Self {
        Self {
            measure,
            required: true,
        }
    }
}
