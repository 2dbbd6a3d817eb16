//! Fan out of one sensor's measurements to any number of subscribers.
//!
//! The polling task owns the [`Publisher`]. Subscribers get the latest value
//! of every measure first, then everything published after. The first
//! subscriber starts the polling task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::Stream;
use protocol::{Measure, Measurement};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{Error, Fault};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub enum StreamState {
    /// Nobody subscribed yet, the hardware has not been touched
    NotStarted,
    Running,
    Completed,
    Faulted(Fault),
}

impl StreamState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Completed | StreamState::Faulted(_))
    }
}

#[derive(Debug, Clone)]
enum Event {
    Measurement(Measurement),
    Completed,
    Faulted(Fault),
}

pub(crate) type Starter = Box<dyn FnOnce() -> JoinHandle<()> + Send>;

struct Inner {
    state: StreamState,
    /// Most recent value per measure, replayed to new subscribers
    latest: Vec<Measurement>,
    starter: Option<Starter>,
    task: Option<JoinHandle<()>>,
    subscribers: usize,
}

struct Shared {
    name: String,
    inner: Mutex<Inner>,
    events: broadcast::Sender<Event>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // nothing panics while holding the lock, recover anyway
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn finish(&self, state: StreamState) {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return;
        }
        let event = match &state {
            StreamState::Faulted(fault) => Event::Faulted(fault.clone()),
            _ => Event::Completed,
        };
        inner.state = state;
        let _ = self.events.send(event);
    }
}

/// Handle to a sensor's measurements, cheap to clone.
#[derive(Clone)]
pub struct MeasurementStream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MeasurementStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementStream")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl MeasurementStream {
    pub(crate) fn new(name: impl Into<String>) -> (Self, Publisher) {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let shared = Arc::new(Shared {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: StreamState::NotStarted,
                latest: Vec::new(),
                starter: None,
                task: None,
                subscribers: 0,
            }),
            events,
        });
        let publisher = Publisher {
            shared: shared.clone(),
        };
        (Self { shared }, publisher)
    }

    /// Set what runs once the first subscriber arrives.
    pub(crate) fn arm(&self, starter: Starter) {
        self.shared.lock().starter = Some(starter);
    }

    /// Replays the latest value of every measure, then follows live
    /// measurements. Subscribing to a stream that has not started yet
    /// starts it.
    ///
    /// # Panics
    /// Starting the stream spawns a task, that panics outside a tokio
    /// runtime.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let mut inner = self.shared.lock();
        let replay = inner.latest.iter().copied().collect();
        let events = self.shared.events.subscribe();
        let terminal = match &inner.state {
            StreamState::Completed => Some(None),
            StreamState::Faulted(fault) => Some(Some(fault.clone())),
            StreamState::NotStarted | StreamState::Running => None,
        };

        inner.subscribers += 1;
        if inner.subscribers == 1 && matches!(inner.state, StreamState::NotStarted) {
            if let Some(start) = inner.starter.take() {
                debug!("first subscriber for {}, starting", self.shared.name);
                inner.state = StreamState::Running;
                inner.task = Some(start());
            }
        }

        Subscription {
            shared: self.shared.clone(),
            replay,
            events,
            terminal,
            done: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.shared.lock().state.clone()
    }

    #[must_use]
    pub fn latest(&self, measure: Measure) -> Option<Measurement> {
        self.shared
            .lock()
            .latest
            .iter()
            .find(|m| m.measure() == measure)
            .copied()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The running polling task, if there is one. A stream that never
    /// started is completed right away and its starter dropped, that
    /// releases whatever the starter owned without touching the hardware.
    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        let mut inner = self.shared.lock();
        if matches!(inner.state, StreamState::NotStarted) {
            let starter = inner.starter.take();
            inner.state = StreamState::Completed;
            let _ = self.shared.events.send(Event::Completed);
            // the starter owns the publisher, its drop takes the lock
            drop(inner);
            drop(starter);
            return None;
        }
        inner.task.take()
    }
}

/// Write side of a [`MeasurementStream`], owned by the polling task.
///
/// Dropping it without calling [`complete`](Self::complete) or
/// [`fault`](Self::fault) (the task panicked or got aborted) faults the
/// stream.
pub(crate) struct Publisher {
    shared: Arc<Shared>,
}

impl Publisher {
    pub(crate) fn publish(&self, measurement: Measurement) {
        let mut inner = self.shared.lock();
        if let Some(slot) = inner
            .latest
            .iter_mut()
            .find(|m| m.measure() == measurement.measure())
        {
            *slot = measurement;
        } else {
            inner.latest.push(measurement);
        }
        // no receivers is fine, the value is kept for replay
        let _ = self.shared.events.send(Event::Measurement(measurement));
    }

    pub(crate) fn complete(self) {
        self.shared.finish(StreamState::Completed);
    }

    pub(crate) fn fault(self, fault: Fault) {
        self.shared.finish(StreamState::Faulted(fault));
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.shared
            .finish(StreamState::Faulted(Arc::new(Error::TaskLost)));
    }
}

/// One subscriber's view of a [`MeasurementStream`].
pub struct Subscription {
    shared: Arc<Shared>,
    replay: VecDeque<Measurement>,
    events: broadcast::Receiver<Event>,
    /// Set if the stream had already ended when we subscribed
    terminal: Option<Option<Fault>>,
    done: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("stream", &self.shared.name)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Next measurement. `None` once the stream completed, a fault is
    /// yielded once and then the subscription ends.
    ///
    /// A subscriber that falls too far behind skips the measurements it
    /// missed.
    pub async fn recv(&mut self) -> Option<Result<Measurement, Fault>> {
        if self.done {
            return None;
        }
        if let Some(measurement) = self.replay.pop_front() {
            return Some(Ok(measurement));
        }
        if let Some(terminal) = self.terminal.take() {
            self.done = true;
            return terminal.map(Err);
        }

        loop {
            match self.events.recv().await {
                Ok(Event::Measurement(measurement)) => return Some(Ok(measurement)),
                Ok(Event::Completed) | Err(RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
                Ok(Event::Faulted(fault)) => {
                    self.done = true;
                    return Some(Err(fault));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "subscriber of {} fell behind, skipped {skipped} measurements",
                        self.shared.name
                    );
                }
            }
        }
    }

    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.shared.name
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Measurement, Fault>> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|item| (item, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.subscribers = inner.subscribers.saturating_sub(1);
    }
}
