use serde::{Deserialize, Serialize};

/// Side actions a sensor can perform besides measuring. Which ones a
/// sensor supports is listed in its [`SensorInfo`](crate::SensorInfo).
#[derive(strum::EnumDiscriminants, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[strum_discriminants(
    name(CommandKind),
    derive(Hash, strum::Display, strum::EnumString, Serialize, Deserialize),
    strum(serialize_all = "snake_case")
)]
pub enum Command {
    /// Tell the sensor the current CO₂ concentration, it corrects itself
    /// to match
    ForcedRecalibration { target_ppm: u16 },
    /// Compensate for the sensor heating up its surroundings
    SetTemperatureOffset { celsius: f32 },
    SoftReset,
    SelfTest,
    StartFanCleaning,
}

impl CommandKind {
    /// Names of the parameters the command takes
    #[must_use]
    pub const fn parameters(&self) -> &'static [&'static str] {
        match self {
            CommandKind::ForcedRecalibration => &["target_ppm"],
            CommandKind::SetTemperatureOffset => &["celsius"],
            CommandKind::SoftReset | CommandKind::SelfTest | CommandKind::StartFanCleaning => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CommandOutput {
    Done,
    /// Correction the sensor applied during forced recalibration
    Correction { ppm: i32 },
}
