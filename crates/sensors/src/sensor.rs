use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::command::{Command, CommandKind, CommandOutput};
use crate::errors::CommandError;
use crate::input::Links;
use crate::poll::{CommandRequest, Polling};
use crate::stream::{MeasurementStream, StreamState, Subscription};
use crate::{Driver, SensorInfo};

/// A sensor on the bus. Nothing happens on the bus until the first
/// subscriber arrives.
///
/// Dropping the handle stops the sensor without waiting for it, use
/// [`shutdown`](Self::shutdown) to wait until the hardware is stopped.
pub struct Sensor {
    info: &'static SensorInfo,
    stream: MeasurementStream,
    commands: mpsc::Sender<CommandRequest>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("kind", &self.info.kind)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl Sensor {
    pub(crate) fn new<D: Driver>(
        info: &'static SensorInfo,
        name: String,
        driver: D,
        interval: Duration,
        links: Links,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (commands, command_rx) = mpsc::channel(4);
        let (stream, publisher) = MeasurementStream::new(name.clone());

        let polling = Polling {
            driver,
            publisher,
            commands: command_rx,
            links,
            interval,
            cancel: cancel.clone(),
        };
        stream.arm(Box::new(move || tokio::spawn(polling.run(name))));

        Self {
            info,
            stream,
            commands,
            cancel,
        }
    }

    #[must_use]
    pub fn info(&self) -> &'static SensorInfo {
        self.info
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.stream.name()
    }

    #[must_use]
    pub fn stream(&self) -> &MeasurementStream {
        &self.stream
    }

    /// See [`MeasurementStream::subscribe`]
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.stream.subscribe()
    }

    /// Runs a command between two samples. The sensor must be running,
    /// commands the sensor does not list are rejected without using the bus.
    ///
    /// # Errors
    /// See [`CommandError`]
    pub async fn run_command(&self, command: Command) -> Result<CommandOutput, CommandError> {
        let kind = CommandKind::from(&command);
        if !self.info.commands.contains(&kind) {
            return Err(CommandError::Unsupported {
                sensor: self.info.name,
                command: kind,
            });
        }
        match self.stream.state() {
            StreamState::NotStarted => return Err(CommandError::NotRunning),
            StreamState::Completed | StreamState::Faulted(_) => return Err(CommandError::Stopped),
            StreamState::Running => (),
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(CommandRequest { command, reply })
            .await
            .map_err(|_| CommandError::Stopped)?;
        response.await.map_err(|_| CommandError::Stopped)?
    }

    /// Stops sampling, runs the sensor's stop sequence and releases the
    /// device. Returns how the stream ended.
    pub async fn shutdown(self) -> StreamState {
        self.cancel.cancel();
        if let Some(task) = self.stream.take_task() {
            if let Err(err) = task.await {
                error!("polling task of {} panicked: {err}", self.name());
            }
        }
        let state = self.stream.state();
        info!("{} shut down", self.name());
        state
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        self.cancel.cancel();
        // completes a stream that never started, dropping its driver
        let _ = self.stream.take_task();
    }
}
