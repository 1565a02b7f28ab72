use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{BusError, Result};

/// Connection state of a bus. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disposed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Disposed => f.write_str("disposed"),
        }
    }
}

/// One-shot signal that holds dependent work back until the connection is
/// established.
///
/// Once disposed the gate never opens again and every waiter fails.
#[derive(Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl ReadinessGate {
    /// A closed gate in the `Connecting` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Connecting);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Move `Connecting` to `Connected`. Returns whether the state changed.
    pub fn open(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        })
    }

    /// Move to `Disposed`. Returns whether the state changed.
    pub fn close(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ConnectionState::Disposed {
                false
            } else {
                *state = ConnectionState::Disposed;
                true
            }
        })
    }

    /// Wait until the gate opens. Fails with [`BusError::Disposed`] if it is
    /// closed instead.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map(|state| *state)
            .map_err(|_| BusError::Disposed)?;
        match state {
            ConnectionState::Connected => Ok(()),
            _ => Err(BusError::Disposed),
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("state", &self.state())
            .finish()
    }
}
