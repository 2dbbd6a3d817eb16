use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::command::{Command, CommandOutput};
use crate::errors::{CommandError, Error, Fault};
use crate::input::Links;
use crate::stream::Publisher;
use crate::Driver;

/// Longest the stop sequence may take once shutdown is requested.
pub(crate) const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub(crate) struct CommandRequest {
    pub(crate) command: Command,
    pub(crate) reply: oneshot::Sender<Result<CommandOutput, CommandError>>,
}

pub(crate) struct Polling<D> {
    pub(crate) driver: D,
    pub(crate) publisher: Publisher,
    pub(crate) commands: mpsc::Receiver<CommandRequest>,
    pub(crate) links: Links,
    pub(crate) interval: Duration,
    pub(crate) cancel: CancellationToken,
}

impl<D: Driver> Polling<D> {
    #[instrument(name = "poll", skip_all, fields(sensor = %name))]
    pub(crate) async fn run(self, name: String) {
        let Polling {
            mut driver,
            publisher,
            mut commands,
            links,
            interval,
            cancel,
        } = self;

        let forwarding = cancel.child_token();
        let forwarders = links.connect(&forwarding);

        let outcome = poll(&mut driver, &publisher, &mut commands, interval, &cancel).await;
        if let Err(fault) = &outcome {
            warn!("stopping: {fault}");
        }

        match timeout(SHUTDOWN_GRACE, driver.stop()).await {
            Ok(Ok(())) => debug!("stopped"),
            Ok(Err(err)) => warn!("stop sequence failed: {err}"),
            Err(_) => warn!("{}", Error::ShutdownTimedOut(SHUTDOWN_GRACE)),
        }
        drop(driver);

        commands.close();
        while let Ok(CommandRequest { reply, .. }) = commands.try_recv() {
            let _ = reply.send(Err(CommandError::Stopped));
        }

        forwarding.cancel();
        for forwarder in forwarders {
            if let Err(err) = forwarder.await {
                warn!("dependency forwarder panicked: {err}");
            }
        }

        match outcome {
            Ok(()) => publisher.complete(),
            Err(fault) => publisher.fault(fault),
        }
    }
}

async fn poll(
    driver: &mut impl Driver,
    publisher: &Publisher,
    commands: &mut mpsc::Receiver<CommandRequest>,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), Fault> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        res = driver.start() => res?,
    }

    let mut ticks = interval_at(Instant::now() + interval, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            Some(CommandRequest { command, reply }) = commands.recv() => {
                let res = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        let _ = reply.send(Err(CommandError::Stopped));
                        return Ok(());
                    }
                    res = driver.affect(command) => res,
                };
                match res {
                    Ok(output) => {
                        let _ = reply.send(Ok(output));
                    }
                    Err(err) if err.is_fatal() => {
                        let fault = Fault::new(err);
                        let _ = reply.send(Err(CommandError::Failed(fault.clone())));
                        return Err(fault);
                    }
                    Err(err) => {
                        let _ = reply.send(Err(CommandError::Failed(Fault::new(err))));
                    }
                }
            }
            _ = ticks.tick() => {
                let measurements = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(()),
                    res = driver.try_measure() => res?,
                };
                for measurement in measurements {
                    publisher.publish(measurement);
                }
            }
        }
    }
}
