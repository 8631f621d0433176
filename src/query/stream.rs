//! Per-subscriber event streams.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::types::QueryEvent;

/// Events delivered to one observer of a query.
///
/// Starts with a replay of the keys currently inside the circle (as
/// `Entered` events, if the observer asked for them), then follows live
/// changes. The stream ends when the query is unsubscribed or dropped.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<QueryEvent>,
}

impl EventStream {
    pub(crate) const fn new(rx: mpsc::UnboundedReceiver<QueryEvent>) -> Self {
        Self { rx }
    }

    /// Takes the next event if one is already buffered.
    pub fn try_next(&mut self) -> Option<QueryEvent> {
        self.rx.try_recv().ok()
    }

    /// Takes every buffered event.
    pub fn drain(&mut self) -> Vec<QueryEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

impl Stream for EventStream {
    type Item = QueryEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
