//! Outbound event stream
//!
//! Events flow to the host through a single [`EventSink`] installed when the
//! host starts listening. While nobody listens, events are dropped.

use crate::message::Message;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Transport end that delivers encoded events to the host
pub trait EventSink: Send + Sync {
    fn success(&self, event: Vec<u8>);
}

/// Shared handle to the current event sink
#[derive(Clone, Default)]
pub struct EventStream {
    sink: Arc<RwLock<Option<Arc<dyn EventSink>>>>,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the host's sink, replacing any previous one
    pub fn listen(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        debug!("Event stream listener attached");
    }

    pub fn cancel(&self) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("Event stream listener detached");
    }

    pub fn is_listening(&self) -> bool {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Encode and push an event
    ///
    /// Never fails: encoding errors are logged and the event is dropped.
    pub fn emit(&self, message: &Message) {
        let bytes = match message.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "Failed to encode {} event for key {}: {}",
                    message.category.as_str(),
                    message.key,
                    e
                );
                return;
            }
        };

        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match sink {
            Some(sink) => sink.success(bytes),
            None => debug!(
                "No event listener, dropping {} for key {}",
                message.category.as_str(),
                message.key
            ),
        }
    }
}

/// Event sink backed by an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelEventSink {
    fn success(&self, event: Vec<u8>) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver closed, dropping event");
        }
    }
}
