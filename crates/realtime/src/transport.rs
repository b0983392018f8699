//! The seam between a subscription and the backend's change stream.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::channel::{ChangePayload, ChannelSpec};
use crate::error::RealtimeError;

/// Something that happened on an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The server acknowledged the subscription.
    Subscribed,
    /// A row changed.
    Change(ChangePayload),
    /// The transport failed; the link is unusable.
    Error(String),
    /// The server closed the channel cleanly.
    Closed,
}

type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// An open channel: a stream of events plus the means to release it.
///
/// The release action runs exactly once, either through [`Self::release`]
/// or when the link is dropped.
pub struct ChannelLink {
    events: mpsc::Receiver<ChannelEvent>,
    release: Option<ReleaseFn>,
}

impl ChannelLink {
    /// Wrap an event stream with the action that tears the channel down.
    pub fn new(
        events: mpsc::Receiver<ChannelEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next event. `None` means the transport went away without
    /// saying goodbye.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Release the channel now.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            self.events.close();
            release();
        }
    }
}

impl Drop for ChannelLink {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for ChannelLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelLink")
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

/// Opens channels on the backend's change stream.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open a channel and start the subscribe handshake.
    ///
    /// The returned link reports [`ChannelEvent::Subscribed`] once the
    /// server acknowledges the join.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be opened at all.
    async fn open(&self, spec: &ChannelSpec) -> Result<ChannelLink, RealtimeError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_release_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::channel(1);
        let counter = Arc::clone(&count);
        let link = ChannelLink::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        link.release();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let count = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::channel(1);
        let counter = Arc::clone(&count);
        drop(ChannelLink::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
