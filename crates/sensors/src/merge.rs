use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, SelectAll};
use futures::{Stream, StreamExt};
use protocol::Measurement;

use crate::errors::Fault;
use crate::stream::Subscription;

/// Measurements of many sensors as one stream, see [`merge`].
pub struct Merged {
    inner: SelectAll<BoxStream<'static, Result<Measurement, Fault>>>,
    faulted: bool,
}

impl std::fmt::Debug for Merged {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merged")
            .field("streams", &self.inner.len())
            .field("faulted", &self.faulted)
            .finish()
    }
}

/// Interleaves the subscriptions in arrival order. Ends when all of them
/// completed, or right after the first fault from any of them.
pub fn merge(subscriptions: impl IntoIterator<Item = Subscription>) -> Merged {
    Merged {
        inner: futures::stream::select_all(
            subscriptions
                .into_iter()
                .map(|sub| sub.into_stream().boxed()),
        ),
        faulted: false,
    }
}

impl Stream for Merged {
    type Item = Result<Measurement, Fault>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.faulted {
            return Poll::Ready(None);
        }
        let next = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(Some(Err(_))) = &next {
            self.faulted = true;
            // dropping the other subscriptions right away
            self.inner.clear();
        }
        next
    }
}
