//! Feeding one sensor's measurements into another.
//!
//! A dependent sensor reads its dependencies through an [`Input`], a single
//! slot holding the latest value. Forwarding tasks fill the slot from the
//! producers' streams. They only start once the dependent itself starts, so
//! wiring sensors together touches no hardware.

use std::sync::Arc;

use protocol::{Measure, Measurement};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::SetupError;
use crate::stream::{MeasurementStream, Subscription};
use crate::SensorInfo;

/// Latest value of a measure some other sensor produces.
#[derive(Debug)]
pub struct Input {
    measure: Measure,
    slot: Option<watch::Receiver<Option<Measurement>>>,
}

impl Input {
    /// An input nothing feeds, the sensor runs on its defaults.
    #[must_use]
    pub fn unavailable(measure: Measure) -> Self {
        Self {
            measure,
            slot: None,
        }
    }

    #[must_use]
    pub fn measure(&self) -> Measure {
        self.measure
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.slot.is_some()
    }

    /// The value if it changed since the last call.
    pub fn take_new(&mut self) -> Option<Measurement> {
        let slot = self.slot.as_mut()?;
        // works after the producers are gone too, their last value stays
        if slot.borrow().has_changed() {
            *slot.borrow_and_update()
        } else {
            None
        }
    }

    #[must_use]
    pub fn latest(&self) -> Option<Measurement> {
        *self.slot.as_ref()?.borrow()
    }
}

struct Link {
    measure: Measure,
    sources: Vec<MeasurementStream>,
    slot: Arc<watch::Sender<Option<Measurement>>>,
}

/// The forwarding a sensor needs once it runs.
#[derive(Default)]
pub(crate) struct Links(Vec<Link>);

impl Links {
    /// Subscribes to every producer, the forwarders stop when `cancel`
    /// fires or their producer's stream ends.
    pub(crate) fn connect(self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        for Link {
            measure,
            sources,
            slot,
        } in self.0
        {
            for source in sources {
                let subscription = source.subscribe();
                tasks.push(tokio::spawn(forward(
                    subscription,
                    measure,
                    slot.clone(),
                    cancel.clone(),
                )));
            }
        }
        tasks
    }
}

async fn forward(
    mut subscription: Subscription,
    measure: Measure,
    slot: Arc<watch::Sender<Option<Measurement>>>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = subscription.recv() => next,
        };
        match next {
            Some(Ok(measurement)) if measurement.measure() == measure => {
                slot.send_replace(Some(measurement));
            }
            Some(Ok(_)) => (),
            Some(Err(fault)) => {
                warn!(
                    "dependency {} failed, no more {measure} from it: {fault}",
                    subscription.stream_name()
                );
                break;
            }
            None => {
                debug!("dependency {} completed", subscription.stream_name());
                break;
            }
        }
    }
}

/// The inputs handed to a sensor when it is created.
#[derive(Default)]
pub struct Inputs {
    slots: Vec<Input>,
    pub(crate) links: Links,
}

impl std::fmt::Debug for Inputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inputs")
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

impl Inputs {
    /// No dependency is fed.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Connects every dependency of `info` to all of `producers` that
    /// measure it. Every matching producer feeds the same slot, the most
    /// recent value wins.
    ///
    /// # Errors
    /// A required dependency no producer measures.
    pub fn resolve<'a, 'b>(
        info: &SensorInfo,
        producers: impl IntoIterator<Item = (&'a SensorInfo, &'b MeasurementStream)> + Clone,
    ) -> Result<Self, SetupError> {
        let mut inputs = Self::default();
        for dependency in info.dependencies {
            let sources: Vec<_> = producers
                .clone()
                .into_iter()
                .filter(|(producer, _)| producer.measures.contains(&dependency.measure))
                .map(|(_, stream)| stream.clone())
                .collect();

            if sources.is_empty() {
                if dependency.required {
                    return Err(SetupError::MissingDependency {
                        sensor: info.name,
                        measure: dependency.measure,
                    });
                }
                debug!(
                    "{} runs without {}, nothing measures it",
                    info.name, dependency.measure
                );
                inputs.slots.push(Input::unavailable(dependency.measure));
                continue;
            }

            let (slot, receiver) = watch::channel(None);
            inputs.slots.push(Input {
                measure: dependency.measure,
                slot: Some(receiver),
            });
            inputs.links.0.push(Link {
                measure: dependency.measure,
                sources,
                slot: Arc::new(slot),
            });
        }
        Ok(inputs)
    }

    /// The input for `measure`, unavailable if nothing feeds it.
    pub fn take(&mut self, measure: Measure) -> Input {
        match self.slots.iter().position(|input| input.measure == measure) {
            Some(idx) => self.slots.swap_remove(idx),
            None => Input::unavailable(measure),
        }
    }
}
