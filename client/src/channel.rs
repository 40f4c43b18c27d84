//! Hand-off between the poller task and whoever displays its results
//!
//! Statuses flow poller → consumer in order, and every one is delivered.
//! Refresh requests flow the other way; any number of pending requests count
//! as one.

use log::debug;
use shared::ServerStatus;
use tokio::sync::mpsc;

/// Request for an immediate poll. Carries no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refresh;

pub fn status_channel() -> (StatusPublisher, StatusReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusPublisher { tx }, StatusReceiver { rx })
}

pub fn refresh_channel() -> (RefreshSender, RefreshReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RefreshSender { tx }, RefreshReceiver { rx })
}

/// Poller side of the status stream.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: mpsc::UnboundedSender<ServerStatus>,
}

impl StatusPublisher {
    /// Returns false once the consumer has gone away; polling carries on regardless.
    pub fn publish(&self, status: ServerStatus) -> bool {
        if self.tx.send(status).is_err() {
            debug!("Status receiver dropped, discarding status");
            return false;
        }
        true
    }
}

/// Consumer side of the status stream.
#[derive(Debug)]
pub struct StatusReceiver {
    rx: mpsc::UnboundedReceiver<ServerStatus>,
}

impl StatusReceiver {
    /// Waits for the next status. `None` once the poller has stopped and
    /// everything it sent has been read.
    pub async fn recv(&mut self) -> Option<ServerStatus> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ServerStatus> {
        self.rx.try_recv().ok()
    }

    /// For consumers running on a plain thread, such as a GUI event loop.
    /// Panics if called from inside an async context.
    pub fn blocking_recv(&mut self) -> Option<ServerStatus> {
        self.rx.blocking_recv()
    }
}

/// Consumer side of the refresh path. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RefreshSender {
    tx: mpsc::UnboundedSender<Refresh>,
}

impl RefreshSender {
    /// Returns false if the poller is no longer running.
    pub fn refresh(&self) -> bool {
        self.tx.send(Refresh).is_ok()
    }
}

/// Poller side of the refresh path.
#[derive(Debug)]
pub struct RefreshReceiver {
    rx: mpsc::UnboundedReceiver<Refresh>,
}

impl RefreshReceiver {
    /// Drains every pending request; true if there was at least one.
    pub fn take_pending(&mut self) -> bool {
        let mut requested = false;
        while let Ok(Refresh) = self.rx.try_recv() {
            requested = true;
        }
        requested
    }
}
