//! Event plumbing between raw driver objects and their adapters.
//!
//! Raw connections and pools announce lifecycle changes through an
//! [`EventHub`]. Adapters re-emit a fixed set of those events to their own
//! subscribers through an [`EventBridge`], which keeps exactly one
//! forwarding listener per event kind on the source for as long as the
//! adapter has at least one subscriber for that kind.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::driver::{DriverError, Handshake, PoolConnection};

/// The named events the wrapped driver emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Error,
    Connect,
    End,
    Drain,
    Enqueue,
    Acquire,
    Connection,
    Release,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Connect => write!(f, "connect"),
            Self::End => write!(f, "end"),
            Self::Drain => write!(f, "drain"),
            Self::Enqueue => write!(f, "enqueue"),
            Self::Acquire => write!(f, "acquire"),
            Self::Connection => write!(f, "connection"),
            Self::Release => write!(f, "release"),
        }
    }
}

/// What an event carries to its listeners.
#[derive(Clone)]
pub enum EventPayload {
    None,
    Error(DriverError),
    Handshake(Handshake),
    Connection(Arc<dyn PoolConnection>),
}

impl EventPayload {
    /// The driver error, when the payload carries one.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Error(e) => f.debug_tuple("Error").field(e).finish(),
            Self::Handshake(h) => f.debug_tuple("Handshake").field(h).finish(),
            Self::Connection(_) => f.write_str("Connection(..)"),
        }
    }
}

/// A listener registered on an [`EventHub`].
pub type EventListener = Arc<dyn Fn(&EventPayload) + Send + Sync>;

/// Stable handle to a registered listener.
///
/// Ids come from one process-wide counter, so an id handed out by one hub
/// never matches a listener registered on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// A registry of event listeners keyed by event kind.
///
/// Dispatch clones the listener list out of the lock before invoking
/// anything, so listeners may subscribe or unsubscribe re-entrantly.
#[derive(Default)]
pub struct EventHub {
    listeners: Mutex<HashMap<EventKind, Vec<(ListenerId, EventListener)>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for the given event kind.
    pub fn subscribe(&self, kind: EventKind, listener: EventListener) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));

        self.listeners.lock().unwrap().entry(kind).or_default().push((id, listener));

        id
    }

    /// Remove a listener, returning the kind it was registered for.
    pub fn unsubscribe(&self, id: ListenerId) -> Option<EventKind> {
        let mut listeners = self.listeners.lock().unwrap();

        for (kind, registered) in listeners.iter_mut() {
            if let Some(position) = registered.iter().position(|(listener_id, _)| *listener_id == id) {
                registered.remove(position);
                return Some(*kind);
            }
        }

        None
    }

    /// Invoke every listener registered for the kind.
    pub fn emit(&self, kind: EventKind, payload: &EventPayload) {
        let listeners: Vec<EventListener> = {
            let registered = self.listeners.lock().unwrap();

            registered
                .get(&kind)
                .map(|listeners| listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect())
                .unwrap_or_default()
        };

        for listener in listeners {
            listener(payload);
        }
    }

    /// The number of listeners currently registered for the kind.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().unwrap().get(&kind).map_or(0, Vec::len)
    }
}

/// Ref-counted forwarding of source events into an adapter's own hub.
///
/// The first subscriber for a forwarded kind attaches one listener to the
/// source; removing the last subscriber detaches it again. Subscribe and
/// unsubscribe cycles therefore never grow the source's listener list, and
/// every adapter subscriber for a kind shares the single source listener.
pub(crate) struct EventBridge {
    forwarded: &'static [EventKind],
    hub: Arc<EventHub>,
    forwarders: Mutex<HashMap<EventKind, ListenerId>>,
}

impl EventBridge {
    pub(crate) fn new(forwarded: &'static [EventKind]) -> Self {
        Self {
            forwarded,
            hub: Arc::new(EventHub::new()),
            forwarders: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn subscribe(&self, source: &EventHub, kind: EventKind, listener: EventListener) -> ListenerId {
        let id = self.hub.subscribe(kind, listener);

        if self.forwarded.contains(&kind) {
            let mut forwarders = self.forwarders.lock().unwrap();

            if !forwarders.contains_key(&kind) {
                // Weak, so a source outliving the adapter does not keep the
                // adapter's hub alive through the forwarder.
                let hub = Arc::downgrade(&self.hub);

                let source_id = source.subscribe(
                    kind,
                    Arc::new(move |payload| {
                        if let Some(hub) = Weak::upgrade(&hub) {
                            hub.emit(kind, payload);
                        }
                    }),
                );

                forwarders.insert(kind, source_id);
                trace!("Attached a forwarding listener for `{}` events", kind);
            }
        }

        id
    }

    pub(crate) fn unsubscribe(&self, source: &EventHub, id: ListenerId) -> bool {
        let Some(kind) = self.hub.unsubscribe(id) else {
            return false;
        };

        if self.forwarded.contains(&kind) {
            let mut forwarders = self.forwarders.lock().unwrap();

            if self.hub.listener_count(kind) == 0 {
                if let Some(source_id) = forwarders.remove(&kind) {
                    source.unsubscribe(source_id);
                    trace!("Detached the forwarding listener for `{}` events", kind);
                }
            }
        }

        true
    }

    pub(crate) fn detach_all(&self, source: &EventHub) {
        let forwarders: Vec<ListenerId> = self.forwarders.lock().unwrap().drain().map(|(_, id)| id).collect();

        for id in forwarders {
            source.unsubscribe(id);
        }
    }
}
