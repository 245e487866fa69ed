//! The "unauthorized" signal: how arbitrary API call sites tell the
//! session manager that the server rejected their bearer token.
//!
//! Call sites don't depend on the session manager. They hold an
//! [`UnauthorizedSignal`] (a cheap, cloneable sender) and raise it when a
//! request comes back `401`. The session manager owns the matching
//! [`UnauthorizedEvents`] receiver and reacts by refreshing the token.

use tokio::sync::mpsc;

/// One observed `401` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unauthorized {
    /// What was being called, for logs (e.g. `GET /api_keys/get_keys`).
    pub source: String,
}

/// Sending half. Clone it into every component that makes authenticated
/// requests.
#[derive(Debug, Clone)]
pub struct UnauthorizedSignal {
    tx: mpsc::UnboundedSender<Unauthorized>,
}

impl UnauthorizedSignal {
    /// Creates a connected sender/receiver pair.
    pub fn channel() -> (Self, UnauthorizedEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnauthorizedEvents { rx })
    }

    /// Reports a `401`. Never blocks; if nobody is listening any more the
    /// event is dropped.
    pub fn raise(&self, source: impl Into<String>) {
        let event = Unauthorized {
            source: source.into(),
        };
        if self.tx.send(event).is_err() {
            tracing::trace!("unauthorized signal raised with no listener");
        }
    }

    /// `true` once the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, owned by the session manager.
#[derive(Debug)]
pub struct UnauthorizedEvents {
    rx: mpsc::UnboundedReceiver<Unauthorized>,
}

impl UnauthorizedEvents {
    /// Waits for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Unauthorized> {
        self.rx.recv().await
    }

    /// Discards events already queued and returns how many there were.
    ///
    /// Used after handling one event: `401`s that piled up while the
    /// token was being refreshed were caused by the old token.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}
