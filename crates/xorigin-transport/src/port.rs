use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// A message delivered on a port, together with the ports transferred with it.
#[derive(Debug)]
pub struct Transfer<T> {
    /// The message payload.
    pub data: T,
    /// Ports handed over to the receiver. Ownership moves with the message.
    pub ports: Vec<Port<T>>,
}

/// One end of an entangled duplex channel.
///
/// Messages posted on one end arrive, in order, on the other. Closing either
/// end closes both. A port whose counterpart was dropped without closing keeps
/// accepting posts and silently discards them; the receiving side is never
/// told that nobody is listening.
pub struct Port<T> {
    sender: PortSender<T>,
    receiver: PortReceiver<T>,
}

/// Sending half of a [`Port`]. Cheap to clone.
pub struct PortSender<T> {
    id: u64,
    tx: mpsc::UnboundedSender<Transfer<T>>,
    closed: CancellationToken,
}

/// Receiving half of a [`Port`].
pub struct PortReceiver<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<Transfer<T>>,
    // Keeps the inbox open so `recv` only ends on an explicit close.
    _inbox: mpsc::UnboundedSender<Transfer<T>>,
    closed: CancellationToken,
}

impl<T> Port<T> {
    /// Create an entangled pair of ports.
    pub fn pair() -> (Port<T>, Port<T>) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let left_id = NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed);
        let right_id = NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed);
        trace!(left = left_id, right = right_id, "created port pair");

        let left = Port {
            sender: PortSender {
                id: left_id,
                tx: right_tx.clone(),
                closed: closed.clone(),
            },
            receiver: PortReceiver {
                id: left_id,
                rx: left_rx,
                _inbox: left_tx.clone(),
                closed: closed.clone(),
            },
        };
        let right = Port {
            sender: PortSender {
                id: right_id,
                tx: left_tx,
                closed: closed.clone(),
            },
            receiver: PortReceiver {
                id: right_id,
                rx: right_rx,
                _inbox: right_tx,
                closed,
            },
        };

        (left, right)
    }

    /// Process-unique port identifier (diagnostics only).
    pub fn id(&self) -> u64 {
        self.sender.id
    }

    /// Post a message to the entangled port.
    pub fn post(&self, data: T, ports: Vec<Port<T>>) -> Result<()> {
        self.sender.post(data, ports)
    }

    /// Receive the next message. Returns `None` once the port is closed.
    pub async fn recv(&mut self) -> Option<Transfer<T>> {
        self.receiver.recv().await
    }

    /// Close both ends of the channel. Idempotent.
    pub fn close(&self) {
        self.sender.close();
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (PortSender<T>, PortReceiver<T>) {
        (self.sender, self.receiver)
    }
}

impl<T> PortSender<T> {
    /// Identifier of the port this half belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Post a message to the entangled port.
    ///
    /// Fails only if the channel was closed. A dropped counterpart discards
    /// the message silently.
    pub fn post(&self, data: T, ports: Vec<Port<T>>) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::PortClosed(self.id));
        }
        if self.tx.send(Transfer { data, ports }).is_err() {
            trace!(port = self.id, "counterpart dropped, message discarded");
        }
        Ok(())
    }

    /// Close both ends of the channel. Idempotent.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!(port = self.id, "closing port");
            self.closed.cancel();
        }
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl<T> PortReceiver<T> {
    /// Identifier of the port this half belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next message. Returns `None` once the port is closed.
    pub async fn recv(&mut self) -> Option<Transfer<T>> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            msg = self.rx.recv() => msg,
        }
    }
}

impl<T> Clone for PortSender<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<T> fmt::Debug for Port<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.sender.id)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl<T> fmt::Debug for PortSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortSender").field("id", &self.id).finish()
    }
}

impl<T> fmt::Debug for PortReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortReceiver").field("id", &self.id).finish()
    }
}
