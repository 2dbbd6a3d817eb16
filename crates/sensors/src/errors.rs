use std::sync::Arc;
use std::time::Duration;

use protocol::Measure;

use crate::command::CommandKind;

/// Terminal failure of a sensor's measurement stream, shared by every
/// subscriber.
pub type Fault = Arc<Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Bus transfer failed: {0}")]
    Bus(#[from] i2c_bus::Error),
    #[error("Wrong chip at address, chip id is {found:#04x} expected {expected:#04x}")]
    WrongChip { expected: u8, found: u8 },
    #[error("Calibration data read from the sensor is not valid")]
    Calibration,
    #[error("Command needs the sensor to be {0}")]
    WrongState(&'static str),
    #[error("Response to a command failed its checksum")]
    CorruptResponse,
    #[error("Forced recalibration failed, the sensor was not measuring long enough")]
    RecalibrationFailed,
    #[error("Self test failed, result: {0:#06x}")]
    SelfTest(u16),
    #[error("{parameter} can not be {value}, allowed: {allowed}")]
    InvalidParameter {
        parameter: &'static str,
        value: f32,
        allowed: &'static str,
    },
    #[error("Driver does not implement {0}")]
    UnsupportedCommand(CommandKind),
    #[error("Stop sequence did not finish within {0:?}")]
    ShutdownTimedOut(Duration),
    #[error("Polling task ended without completing the stream")]
    TaskLost,
}

impl Error {
    /// Whether the sensor can keep running after this. Everything that went
    /// wrong on the bus or with the chip itself ends the stream.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Bus(_) | Error::WrongChip { .. } | Error::Calibration | Error::TaskLost => true,
            Error::WrongState(_)
            | Error::CorruptResponse
            | Error::RecalibrationFailed
            | Error::SelfTest(_)
            | Error::InvalidParameter { .. }
            | Error::UnsupportedCommand(_)
            | Error::ShutdownTimedOut(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Could not open the sensor: {0}")]
    Bus(#[from] i2c_bus::Error),
    #[error("{sensor} needs {measure} but no sensor in the set measures it")]
    MissingDependency {
        sensor: &'static str,
        measure: Measure,
    },
    #[error("{0} needs a VOC index algorithm, none was provided")]
    MissingVocAlgorithm(&'static str),
    #[error("A sensor named {0} already exists")]
    DuplicateName(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{sensor} does not support {command}")]
    Unsupported {
        sensor: &'static str,
        command: CommandKind,
    },
    #[error("Sensor is not running, subscribe to it first")]
    NotRunning,
    #[error("Sensor stopped before the command finished")]
    Stopped,
    #[error("Command failed: {0}")]
    Failed(#[source] Fault),
}
