//! Drivers for environmental sensors on a shared I2C bus, and the machinery
//! that turns each into a stream of [`Measurement`]s.
//!
//! A [`Sensor`] does nothing until someone subscribes to it. Sensors can
//! feed each other (a barometer calibrating a CO₂ sensor), wire them up
//! through a [`SensorSet`].

use std::future::Future;

use protocol::Measurement;

mod command;
pub mod drivers;
pub mod errors;
mod info;
mod input;
mod merge;
mod poll;
mod sensor;
mod set;
mod stream;

pub use command::{Command, CommandKind, CommandOutput};
pub use errors::{CommandError, Error, Fault, SetupError};
pub use info::{SensorInfo, SensorKind, Settings, Setup, VocIndexFn};
pub use input::{Input, Inputs};
pub use merge::{merge, Merged};
pub use sensor::Sensor;
pub use set::SensorSet;
pub use stream::{MeasurementStream, StreamState, Subscription};

/// What the polling task needs from a sensor driver.
///
/// Bus errors returned from any of these end the sensor's stream. Values
/// that fail their checksum are left out of the measurements instead.
pub trait Driver: Send + 'static {
    /// Bring the hardware into its measuring state. Called once, before
    /// the first sample.
    fn start(&mut self) -> impl Future<Output = Result<(), Error>> + Send;
    /// One sample, may be empty if the sensor has nothing new.
    fn try_measure(&mut self) -> impl Future<Output = Result<Vec<Measurement>, Error>> + Send;
    /// For example calibrate, run sensor cleaning etc
    fn affect(
        &mut self,
        command: Command,
    ) -> impl Future<Output = Result<CommandOutput, Error>> + Send {
        async move { Err(Error::UnsupportedCommand(CommandKind::from(&command))) }
    }
    /// Return the hardware to idle. Always called, also after a failure.
    fn stop(&mut self) -> impl Future<Output = Result<(), Error>> + Send;
}
