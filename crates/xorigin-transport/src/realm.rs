use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use url::Url;

use crate::error::{Result, TransportError};
use crate::port::Port;

/// An isolated execution context identified by its origin.
///
/// Other contexts reach a realm only by posting messages to it. Every
/// registered [`Listener`] observes every message the realm receives.
pub struct Realm<T> {
    inner: Arc<RealmInner<T>>,
}

struct RealmInner<T> {
    origin: String,
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<MessageEvent<T>>>>,
    next_listener_id: AtomicU64,
    parent: Mutex<Option<Weak<RealmInner<T>>>>,
}

/// A message received by a realm.
pub struct MessageEvent<T> {
    /// Origin of the realm that posted the message. Set by the transport,
    /// never by the sender.
    pub origin: String,
    /// The message payload.
    pub data: T,
    /// Ports transferred with the message.
    pub ports: Vec<PortSlot<T>>,
}

/// A transferred port shared by every listener that observed the event.
///
/// Exactly one listener can claim it.
pub struct PortSlot<T>(Arc<Mutex<Option<Port<T>>>>);

/// Handle through which a hosted realm posts to its host.
pub struct WindowProxy<T> {
    source: Arc<RealmInner<T>>,
}

/// A registered message listener. Unregisters itself when dropped.
pub struct Listener<T> {
    id: u64,
    realm: Weak<RealmInner<T>>,
    rx: mpsc::UnboundedReceiver<MessageEvent<T>>,
}

/// A hosted child realm opened by a host realm.
pub struct Frame<T> {
    url: String,
    realm: Realm<T>,
}

impl<T: Clone + Send + 'static> Realm<T> {
    /// Create a top-level realm.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RealmInner {
                origin: origin.into(),
                listeners: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
                parent: Mutex::new(None),
            }),
        }
    }

    /// Origin of this realm.
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    /// Register a listener for messages posted to this realm.
    pub fn listen(&self) -> Listener<T> {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.listeners).insert(id, tx);
        trace!(origin = %self.inner.origin, listener = id, "listener registered");
        Listener {
            id,
            realm: Arc::downgrade(&self.inner),
            rx,
        }
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    /// Proxy for the realm hosting this one, if any.
    pub fn parent(&self) -> Option<WindowProxy<T>> {
        let parent = lock(&self.inner.parent);
        parent.as_ref().and_then(Weak::upgrade).map(|_| WindowProxy {
            source: Arc::clone(&self.inner),
        })
    }

    /// Deliver a message to this realm as if posted from `source_origin`.
    pub fn post_message_from(
        &self,
        source_origin: &str,
        data: T,
        target_origin: &str,
        ports: Vec<Port<T>>,
    ) {
        deliver(&self.inner, source_origin, data, target_origin, ports);
    }

    /// Open a hosted frame whose realm origin is derived from `url`.
    pub fn open_frame(&self, url: &str) -> Result<Frame<T>> {
        let origin = origin_of(url)?;
        let child = Realm::new(origin);
        *lock(&child.inner.parent) = Some(Arc::downgrade(&self.inner));
        info!(host = %self.inner.origin, frame = %child.inner.origin, "opened frame");
        Ok(Frame {
            url: url.to_string(),
            realm: child,
        })
    }
}

impl<T: Clone + Send + 'static> WindowProxy<T> {
    /// Post a message to the host realm.
    ///
    /// `target_origin` restricts delivery: unless it is `*`, the message is
    /// dropped when the host's origin differs.
    pub fn post_message(&self, data: T, target_origin: &str, ports: Vec<Port<T>>) -> Result<()> {
        let parent = lock(&self.source.parent).as_ref().and_then(Weak::upgrade);
        let Some(parent) = parent else {
            return Err(TransportError::FrameRemoved(self.source.origin.clone()));
        };
        deliver(&parent, &self.source.origin, data, target_origin, ports);
        Ok(())
    }
}

impl<T> Listener<T> {
    /// Receive the next message event. Returns `None` once the realm is gone.
    pub async fn recv(&mut self) -> Option<MessageEvent<T>> {
        self.rx.recv().await
    }

    /// Explicitly unregister this listener.
    pub fn unlisten(self) {}
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        if let Some(realm) = self.realm.upgrade() {
            lock(&realm.listeners).remove(&self.id);
            trace!(origin = %realm.origin, listener = self.id, "listener removed");
        }
    }
}

impl<T> PortSlot<T> {
    fn new(port: Port<T>) -> Self {
        Self(Arc::new(Mutex::new(Some(port))))
    }

    /// Claim the port. Returns `None` if another listener already took it.
    pub fn take(&self) -> Option<Port<T>> {
        lock(&self.0).take()
    }
}

impl<T: Clone + Send + 'static> Frame<T> {
    /// URL the frame was opened with.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The hosted realm.
    pub fn realm(&self) -> &Realm<T> {
        &self.realm
    }

    /// Detach the frame from its host. Idempotent.
    pub fn remove(&self) {
        if lock(&self.realm.inner.parent).take().is_some() {
            debug!(frame = %self.realm.inner.origin, "frame removed");
        }
    }

    /// Whether the frame has been removed.
    pub fn is_removed(&self) -> bool {
        lock(&self.realm.inner.parent).is_none()
    }
}

/// Derive the origin (`scheme://host[:port]`) of a URL.
///
/// Parsing follows the WHATWG URL rules, so `HTTP://Sub.Example.com:80/app`
/// yields `http://sub.example.com` and `http://evil.com\@good.com/` yields
/// `http://evil.com`. URLs with an opaque origin (`data:`, `about:`, custom
/// schemes) cannot host a frame.
pub fn origin_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|err| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })?;

    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(TransportError::InvalidUrl {
            url: url.to_string(),
            reason: format!("scheme {:?} has an opaque origin", parsed.scheme()),
        });
    }
    Ok(origin.ascii_serialization())
}

fn deliver<T: Clone + Send + 'static>(
    target: &RealmInner<T>,
    source_origin: &str,
    data: T,
    target_origin: &str,
    ports: Vec<Port<T>>,
) {
    if target_origin != "*" && !target_origin.eq_ignore_ascii_case(&target.origin) {
        trace!(
            realm = %target.origin,
            target_origin,
            "target origin mismatch, message dropped"
        );
        return;
    }

    let slots: Vec<PortSlot<T>> = ports.into_iter().map(PortSlot::new).collect();
    let mut listeners = lock(&target.listeners);
    listeners.retain(|_, tx| {
        tx.send(MessageEvent {
            origin: source_origin.to_string(),
            data: data.clone(),
            ports: slots.clone(),
        })
        .is_ok()
    });
    trace!(
        realm = %target.origin,
        source = source_origin,
        listeners = listeners.len(),
        "message delivered"
    );
}

fn lock<M>(mutex: &Mutex<M>) -> MutexGuard<'_, M> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> Clone for Realm<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Clone for PortSlot<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone> Clone for MessageEvent<T> {
    fn clone(&self) -> Self {
        Self {
            origin: self.origin.clone(),
            data: self.data.clone(),
            ports: self.ports.clone(),
        }
    }
}

impl<T> fmt::Debug for Realm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("origin", &self.inner.origin)
            .finish()
    }
}

impl<T> fmt::Debug for Frame<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("url", &self.url)
            .field("origin", &self.realm.inner.origin)
            .finish()
    }
}

impl<T: fmt::Debug> fmt::Debug for MessageEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("origin", &self.origin)
            .field("data", &self.data)
            .field("ports", &self.ports.len())
            .finish()
    }
}
