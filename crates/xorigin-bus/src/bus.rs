use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_core::future::BoxFuture;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use xorigin_codec::{from_envelope, to_envelope, Arguments, BlockEncoding, Envelope, WireMessage};
use xorigin_transport::{Frame, Port, PortReceiver, PortSender, Transfer};

use crate::config::BusOptions;
use crate::control;
use crate::error::{BusError, Result};
use crate::events::{EventBus, Handler, HandlerResult};
use crate::gate::{ConnectionState, ReadinessGate};
use crate::origin::Allowlist;

/// Which end of the handshake a bus runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opens the frame and accepts the connect request.
    Host,
    /// Runs inside the frame and sends the connect request.
    Hosted,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Hosted => f.write_str("hosted"),
        }
    }
}

/// One end of a cross-origin connection.
///
/// Calls made before the connection is established are queued and sent in
/// issue order once it is. Received calls are checked against the origin
/// allowlist and dispatched to the injected [`EventBus`].
///
/// Cloning yields another handle to the same connection. Dropping the last
/// handle disposes it.
#[derive(Clone)]
pub struct CrossOriginBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    role: Role,
    link: Link,
    queue: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    reply_timeout: Option<Duration>,
    frame: Option<Frame<WireMessage>>,
}

/// Shared state of the inbound path.
struct Dispatcher {
    origin: String,
    allowlist: Allowlist,
    hub: Arc<dyn EventBus>,
    gate: ReadinessGate,
    encoding: BlockEncoding,
    remote_origin: Mutex<Option<String>>,
}

/// What background tasks hold on to. Never owns the bus itself.
#[derive(Clone)]
pub(crate) struct Link {
    dispatcher: Arc<Dispatcher>,
    port: Arc<Mutex<Option<PortSender<WireMessage>>>>,
    shutdown: CancellationToken,
    runtime: Handle,
}

struct Outbound {
    envelope: Envelope,
    reply: Option<Port<WireMessage>>,
    posted: oneshot::Sender<Result<()>>,
}

struct Pending {
    posted: oneshot::Receiver<Result<()>>,
    reply: Option<Port<WireMessage>>,
}

impl CrossOriginBus {
    pub(crate) fn assemble(
        role: Role,
        origin: String,
        options: &BusOptions,
        hub: Arc<dyn EventBus>,
        frame: Option<Frame<WireMessage>>,
        runtime: Handle,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher {
            origin,
            allowlist: Allowlist::compile(&options.origins),
            hub,
            gate: ReadinessGate::new(),
            encoding: options.encoding,
            remote_origin: Mutex::new(None),
        });
        let link = Link {
            dispatcher,
            port: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
            runtime,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        link.runtime.spawn(pump(link.clone(), rx));

        Self {
            inner: Arc::new(BusInner {
                role,
                link,
                queue: Mutex::new(Some(tx)),
                reply_timeout: options.reply_timeout,
                frame,
            }),
        }
    }

    pub(crate) fn link(&self) -> &Link {
        &self.inner.link
    }

    /// Call a remote handler and wait for its single reply.
    ///
    /// Arguments are encoded right away: a value without a JSON form fails
    /// with a fatal [`BusError::Codec`] before anything is queued. The call
    /// is then sent once the connection is established, after every call
    /// issued earlier on this bus.
    ///
    /// Resolves with the value the remote handler resolved with (`None` if
    /// it resolved with none) or fails with [`BusError::Remote`] carrying its
    /// rejection reason. A call the remote side drops fails with
    /// [`BusError::Timeout`] once the configured reply timeout elapses, or
    /// never settles if there is none.
    pub fn fire<A>(&self, message: &str, args: &A) -> BoxFuture<'static, Result<Option<Value>>>
    where
        A: Arguments + ?Sized,
    {
        let pending = self.enqueue(message, args, true);
        let timeout = self.inner.reply_timeout;
        let encoding = self.inner.link.dispatcher.encoding;
        Box::pin(async move {
            let Pending { posted, reply } = pending?;
            posted.await.map_err(|_| BusError::Disposed)??;
            match reply {
                Some(reply) => control::await_reply(reply, timeout, encoding).await,
                None => Ok(None),
            }
        })
    }

    /// Send an event without waiting for an outcome.
    ///
    /// Resolves once the envelope was posted. The remote side dispatches it
    /// like a call and discards the result.
    pub fn emit<A>(&self, message: &str, args: &A) -> BoxFuture<'static, Result<()>>
    where
        A: Arguments + ?Sized,
    {
        let pending = self.enqueue(message, args, false);
        Box::pin(async move {
            let Pending { posted, .. } = pending?;
            posted.await.map_err(|_| BusError::Disposed)?
        })
    }

    /// Register a handler for calls received from the remote side.
    pub fn on(&self, event: &str, handler: Handler) {
        self.inner.link.dispatcher.hub.on(event, handler);
    }

    /// Release the connection. Idempotent.
    ///
    /// Closes the main port, stops waiting for a connect request and, on the
    /// host side, removes the frame. Queued and later calls fail with
    /// [`BusError::Disposed`]; replies already in flight on their own reply
    /// ports are unaffected.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.link.dispatcher.gate.state()
    }

    /// Wait until the connection is established.
    pub async fn ready(&self) -> Result<()> {
        self.inner.link.dispatcher.gate.ready().await
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Origin this bus declares in its envelopes.
    pub fn origin(&self) -> &str {
        &self.inner.link.dispatcher.origin
    }

    /// Origin of the accepted connect request. Only known on the host side.
    pub fn remote_origin(&self) -> Option<String> {
        lock(&self.inner.link.dispatcher.remote_origin).clone()
    }

    /// The hosted frame (host side only).
    pub fn frame(&self) -> Option<&Frame<WireMessage>> {
        self.inner.frame.as_ref()
    }

    fn enqueue<A>(&self, message: &str, args: &A, with_reply: bool) -> Result<Pending>
    where
        A: Arguments + ?Sized,
    {
        let dispatcher = &self.inner.link.dispatcher;
        let envelope = to_envelope(message, &dispatcher.origin, args, dispatcher.encoding)?;

        let queue = lock(&self.inner.queue);
        let Some(queue) = queue.as_ref() else {
            return Err(BusError::Disposed);
        };

        let (local, remote) = if with_reply {
            let (local, remote) = Port::pair();
            (Some(local), Some(remote))
        } else {
            (None, None)
        };
        let (posted_tx, posted_rx) = oneshot::channel();
        queue
            .send(Outbound {
                envelope,
                reply: remote,
                posted: posted_tx,
            })
            .map_err(|_| BusError::Disposed)?;
        trace!(call = message, with_reply, "call queued");

        Ok(Pending {
            posted: posted_rx,
            reply: local,
        })
    }
}

impl BusInner {
    fn dispose(&self) {
        let first = self.link.dispatcher.gate.close();
        self.link.shutdown.cancel();
        lock(&self.queue).take();
        if let Some(port) = lock(&self.link.port).take() {
            port.close();
        }
        if let Some(frame) = &self.frame {
            frame.remove();
        }
        if first {
            info!(role = %self.role, origin = %self.link.dispatcher.origin, "bus disposed");
        }
    }
}

impl Drop for BusInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Link {
    /// Adopt the connected main port and open the gate.
    ///
    /// Returns `false` (and closes the port) if the bus was disposed first.
    pub(crate) fn attach(&self, port: Port<WireMessage>, remote_origin: Option<String>) -> bool {
        let (sender, receiver) = port.split();
        {
            let mut slot = lock(&self.port);
            if self.shutdown.is_cancelled() {
                drop(slot);
                sender.close();
                return false;
            }
            *slot = Some(sender);
        }
        if let Some(origin) = remote_origin {
            *lock(&self.dispatcher.remote_origin) = Some(origin);
        }

        self.runtime.spawn(receive_loop(
            Arc::clone(&self.dispatcher),
            receiver,
            self.shutdown.clone(),
            self.runtime.clone(),
        ));
        let opened = self.dispatcher.gate.open();
        if opened {
            info!(origin = %self.dispatcher.origin, "bus connected");
        }
        opened
    }

    pub(crate) fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    fn post(&self, envelope: Envelope, reply: Option<Port<WireMessage>>) -> Result<()> {
        let Some(port) = lock(&self.port).clone() else {
            return Err(BusError::Disposed);
        };
        port.post(WireMessage::Envelope(envelope), reply.into_iter().collect())?;
        Ok(())
    }
}

impl Dispatcher {
    /// Handle one envelope received on the main port.
    async fn receive_message(&self, envelope: Envelope, reply: Option<Port<WireMessage>>) {
        if self.gate.ready().await.is_err() {
            return;
        }

        let message = match from_envelope(&envelope, self.encoding) {
            Ok(message) => message,
            Err(err) => {
                warn!(call = %envelope.message, error = %err, "dropping undecodable envelope");
                return;
            }
        };

        let origin = message.origin.as_deref().unwrap_or_default();
        if !self.allowlist.verify(origin) {
            debug!(origin, call = %message.message, "call from unverified origin dropped");
            return;
        }

        trace!(origin, call = %message.message, args = message.args.len(), "dispatching call");
        let result = self.hub.fire(&message.message, message.args).await;

        let Some(reply) = reply else {
            return;
        };
        if let Err(err) = self.send_reply(&reply, &result) {
            debug!(call = %message.message, error = %err, "reply not delivered");
        }
    }

    fn send_reply(&self, reply: &Port<WireMessage>, result: &HandlerResult) -> Result<()> {
        match control::send_reply(reply, result, &self.origin, self.encoding) {
            // A value the encoding cannot carry still owes the caller a reply.
            Err(BusError::Codec(err)) => {
                let reason: HandlerResult = Err(Value::String(err.to_string()));
                control::send_reply(reply, &reason, &self.origin, self.encoding)
            }
            outcome => outcome,
        }
    }
}

/// Post queued calls in order once the gate opens.
async fn pump(link: Link, mut queue: mpsc::UnboundedReceiver<Outbound>) {
    if link.dispatcher.gate.ready().await.is_err() {
        return;
    }

    loop {
        let outbound = tokio::select! {
            biased;
            _ = link.shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
        };
        let posted = link.post(outbound.envelope, outbound.reply);
        // The caller may have stopped waiting.
        let _ = outbound.posted.send(posted);
    }
    trace!(origin = %link.dispatcher.origin, "outbound pump stopped");
}

/// Read the main port and dispatch every envelope on its own task.
async fn receive_loop(
    dispatcher: Arc<Dispatcher>,
    mut receiver: PortReceiver<WireMessage>,
    shutdown: CancellationToken,
    runtime: Handle,
) {
    loop {
        let transfer = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = receiver.recv() => match next {
                Some(transfer) => transfer,
                None => break,
            },
        };

        let Transfer { data, ports } = transfer;
        let WireMessage::Envelope(envelope) = data else {
            trace!(port = receiver.id(), "ignoring text on main port");
            continue;
        };
        let reply = ports.into_iter().next();
        let dispatcher = Arc::clone(&dispatcher);
        runtime.spawn(async move { dispatcher.receive_message(envelope, reply).await });
    }
    debug!(origin = %dispatcher.origin, "receive loop stopped");
}

impl EventBus for CrossOriginBus {
    fn on(&self, event: &str, handler: Handler) {
        self.inner.link.dispatcher.hub.on(event, handler);
    }

    fn fire(&self, event: &str, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        let call = CrossOriginBus::fire(self, event, args.as_slice());
        Box::pin(async move {
            call.await.map_err(|err| match err {
                BusError::Remote(reason) => reason,
                other => Value::String(other.to_string()),
            })
        })
    }
}

impl fmt::Debug for CrossOriginBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossOriginBus")
            .field("role", &self.inner.role)
            .field("origin", &self.inner.link.dispatcher.origin)
            .field("state", &self.state())
            .finish()
    }
}

fn lock<M>(mutex: &Mutex<M>) -> MutexGuard<'_, M> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;
    use xorigin_transport::Realm;

    use super::*;
    use crate::events::{handler, LocalBus};
    use crate::{connect, host};

    fn echo_hub() -> Arc<LocalBus> {
        let hub = Arc::new(LocalBus::new());
        hub.on(
            "echo",
            handler(|args| async move { Ok(args.into_iter().next()) }),
        );
        hub
    }

    async fn connected_pair(
        realm: &Realm<WireMessage>,
        hub: Arc<LocalBus>,
    ) -> (CrossOriginBus, CrossOriginBus) {
        let parent = host(realm, "http://child.com/app", BusOptions::open(), hub).unwrap();
        let frame_realm = parent.frame().unwrap().realm().clone();
        let child = connect(&frame_realm, BusOptions::open(), Arc::new(LocalBus::new())).unwrap();
        parent.ready().await.unwrap();
        (parent, child)
    }

    #[tokio::test]
    async fn states_follow_handshake() {
        let realm = Realm::new("http://host.com");
        let parent = host(
            &realm,
            "http://child.com",
            BusOptions::open(),
            Arc::new(LocalBus::new()),
        )
        .unwrap();
        assert_eq!(parent.role(), Role::Host);
        assert_eq!(parent.state(), ConnectionState::Connecting);
        assert!(parent.remote_origin().is_none());

        let child = connect(
            parent.frame().unwrap().realm(),
            BusOptions::open(),
            Arc::new(LocalBus::new()),
        )
        .unwrap();
        assert_eq!(child.role(), Role::Hosted);
        assert_eq!(child.state(), ConnectionState::Connected);
        assert_eq!(child.origin(), "http://child.com");

        parent.ready().await.unwrap();
        assert_eq!(parent.state(), ConnectionState::Connected);
        assert_eq!(parent.remote_origin().as_deref(), Some("http://child.com"));
        assert_eq!(realm.listener_count(), 0);
    }

    #[tokio::test]
    async fn call_with_no_value_resolves_none() {
        let hub = echo_hub();
        let realm = Realm::new("http://host.com");
        let (_parent, child) = connected_pair(&realm, hub).await;

        assert_eq!(child.fire("echo", &()).await.unwrap(), None);
        assert_eq!(
            child.fire("echo", &("x",)).await.unwrap(),
            Some(json!("x"))
        );
    }

    #[tokio::test]
    async fn emit_dispatches_without_reply() {
        let hub = Arc::new(LocalBus::new());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        hub.on(
            "log",
            handler(move |args| {
                let seen_tx = seen_tx.clone();
                async move {
                    let _ = seen_tx.send(args);
                    Ok(None)
                }
            }),
        );
        let realm = Realm::new("http://host.com");
        let (_parent, child) = connected_pair(&realm, hub).await;

        child.emit("log", &(1, "two")).await.unwrap();
        assert_eq!(seen_rx.recv().await.unwrap(), vec![json!(1), json!("two")]);
    }

    #[tokio::test]
    async fn bus_serves_as_event_bus() {
        let hub = Arc::new(LocalBus::new());
        hub.on("fail", handler(|_| async { Err(json!({"code": 3})) }));
        hub.on("ok", handler(|_| async { Ok(Some(json!(true))) }));
        let realm = Realm::new("http://host.com");
        let (_parent, child) = connected_pair(&realm, hub).await;

        let as_bus: &dyn EventBus = &child;
        assert_eq!(as_bus.fire("ok", Vec::new()).await, Ok(Some(json!(true))));
        assert_eq!(
            as_bus.fire("fail", Vec::new()).await,
            Err(json!({"code": 3}))
        );

        child.dispose();
        let err = as_bus.fire("ok", Vec::new()).await.unwrap_err();
        assert_eq!(err, json!("bus has been disposed"));
    }

    #[tokio::test]
    async fn handlers_registered_on_either_side() {
        let realm = Realm::new("http://host.com");
        let (parent, child) = connected_pair(&realm, Arc::new(LocalBus::new())).await;
        child.on(
            "whoami",
            handler(|_| async { Ok(Some(json!("child"))) }),
        );

        assert_eq!(
            parent.fire("whoami", &()).await.unwrap(),
            Some(json!("child"))
        );
    }

    #[tokio::test]
    async fn non_serializable_argument_is_fatal() {
        let realm = Realm::new("http://host.com");
        let (_parent, child) = connected_pair(&realm, echo_hub()).await;
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);

        let err = child.fire("echo", &(bad,)).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("must be serializable"));
    }

    #[tokio::test]
    async fn latin1_reply_that_cannot_be_encoded_becomes_failure() {
        let hub = Arc::new(LocalBus::new());
        hub.on("wide", handler(|_| async { Ok(Some(json!("✓"))) }));
        let realm = Realm::new("http://host.com");
        let options = BusOptions::open().with_encoding(BlockEncoding::Latin1);
        let parent = host(&realm, "http://child.com", options.clone(), hub).unwrap();
        let child = connect(
            parent.frame().unwrap().realm(),
            options,
            Arc::new(LocalBus::new()),
        )
        .unwrap();

        match child.fire("wide", &()).await {
            Err(BusError::Remote(Value::String(reason))) => {
                assert!(reason.contains("outside Latin-1"))
            }
            other => panic!("expected remote failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_last_handle_disposes() {
        let realm = Realm::new("http://host.com");
        let (parent, child) = connected_pair(&realm, echo_hub()).await;
        let frame_realm = parent.frame().unwrap().realm().clone();
        drop(parent);

        assert!(frame_realm.parent().is_none());
        assert_eq!(child.state(), ConnectionState::Connected);
    }
}
