//! Close-once broadcast signal.
//!
//! Leadership loss is announced by closing a channel: one producer, many
//! consumers, closed at most once across any combination of surrender,
//! explicit unlock, and concurrent watch failures. The sender lives behind
//! an `Option` so that closing is a `take()` - a second close finds the slot
//! already empty instead of panicking.

use std::sync::Mutex;

use tokio::sync::watch;

/// Owning side of the signal.
#[derive(Debug)]
pub struct StopSignal {
    tx: Mutex<Option<watch::Sender<()>>>,
    rx: watch::Receiver<()>,
}

impl StopSignal {
    /// Creates an unfired signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(());
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Returns a listener on this signal.
    ///
    /// Listeners created after the signal has fired observe it as already
    /// fired.
    #[must_use]
    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.rx.clone(),
        }
    }

    /// Fires the signal, waking every listener.
    ///
    /// Returns `true` iff this call performed the close.
    pub fn fire(&self) -> bool {
        match self.tx.lock() {
            Ok(mut guard) => guard.take().is_some(),
            Err(_) => false,
        }
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Consuming side of the signal.
///
/// Returned to the caller of `lock()` as the leadership channel: resolution
/// of [`StopListener::fired`] means leadership is lost.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<()>,
}

impl StopListener {
    /// Resolves once the signal fires. Resolves immediately if it already
    /// has.
    pub async fn fired(&mut self) {
        // `changed` yields Ok for value updates (which never happen; the
        // sender only ever drops) and Err once the sender is gone.
        while self.rx.changed().await.is_ok() {}
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.rx.has_changed().is_err()
    }

    /// Creates a listener on a signal that has already fired.
    ///
    /// Useful for passing "do not block" as a cancellation handle.
    #[must_use]
    pub fn already_fired() -> Self {
        let (tx, rx) = watch::channel(());
        drop(tx);
        Self { rx }
    }
}
