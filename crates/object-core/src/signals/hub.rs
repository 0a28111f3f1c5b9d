use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

use super::types::{MediaEvent, SignalHandle, SignalKind};
use crate::store::IdAllocator;
use crate::types::ObjectId;

/// Callback invoked for every delivered signal.
///
/// Callbacks run on the dispatching (engine) context while the object's
/// subscription entry is locked, so they must not call back into the hub.
pub type SignalCallback = Arc<dyn Fn(&MediaEvent) + Send + Sync>;

struct Subscriber {
    handle: SignalHandle,
    kind: SignalKind,
    callback: SignalCallback,
}

/// Subscriptions of one object.
///
/// The mutex is held for the whole of a dispatch and by the release path
/// while it closes the entry, so a dispatch is either fully delivered before
/// a release or dropped after it.
#[derive(Default)]
struct ObjectSignals {
    closed: bool,
    subscribers: Vec<Subscriber>,
}

/// Routes engine signals to subscribers.
///
/// Handles are drawn from a scrambled sequence so a client cannot guess the
/// handles of other trees; the facade still checks ownership on every use.
pub struct SignalHub {
    handle_ids: IdAllocator,
    objects: DashMap<ObjectId, Arc<Mutex<ObjectSignals>>>,
    handles: DashMap<SignalHandle, ObjectId>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            handle_ids: IdAllocator::new(),
            objects: DashMap::new(),
            handles: DashMap::new(),
        }
    }

    /// Register `callback` for `kind` signals of `object`.
    ///
    /// Only the object store calls this, while it holds the object's tree
    /// lock, so an entry can never be opened for an object that is already
    /// gone.
    pub(crate) fn subscribe(
        &self,
        object: ObjectId,
        kind: SignalKind,
        callback: SignalCallback,
    ) -> SignalHandle {
        let handle = SignalHandle(self.handle_ids.next_value());
        let entry = self
            .objects
            .entry(object)
            .or_insert_with(|| Arc::new(Mutex::new(ObjectSignals::default())))
            .clone();

        entry.lock().subscribers.push(Subscriber {
            handle,
            kind,
            callback,
        });
        self.handles.insert(handle, object);

        debug!("Subscribed {} to {} on object {}", handle, kind, object);
        handle
    }

    /// Deliver a `kind` signal for `object` to each matching subscriber once.
    ///
    /// Returns the number of callbacks invoked. Signals for released or
    /// unknown objects are dropped.
    pub fn dispatch(&self, object: ObjectId, kind: SignalKind) -> usize {
        let entry = match self.objects.get(&object) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                trace!("Dropping {} for object {} without subscribers", kind, object);
                return 0;
            }
        };

        let signals = entry.lock();
        if signals.closed {
            trace!("Dropping {} for released object {}", kind, object);
            return 0;
        }

        let event = MediaEvent::new(object, kind);
        let mut delivered = 0;
        for subscriber in signals.subscribers.iter().filter(|s| s.kind == kind) {
            (subscriber.callback)(&event);
            delivered += 1;
        }

        debug!("Dispatched {} for object {} to {} subscriber(s)", kind, object, delivered);
        delivered
    }

    /// Remove a subscription. Unknown or already removed handles are ignored.
    pub fn unsubscribe(&self, handle: SignalHandle) -> bool {
        let Some((_, object)) = self.handles.remove(&handle) else {
            return false;
        };

        if let Some(entry) = self.objects.get(&object).map(|e| Arc::clone(e.value())) {
            entry.lock().subscribers.retain(|s| s.handle != handle);
        }
        debug!("Unsubscribed {} from object {}", handle, object);
        true
    }

    /// Close every subscription of a released object.
    ///
    /// Waits for an in-flight dispatch on the object to finish. Returns the
    /// number of subscriptions dropped.
    pub(crate) fn close_object(&self, object: ObjectId) -> usize {
        let Some((_, entry)) = self.objects.remove(&object) else {
            return 0;
        };

        let mut signals = entry.lock();
        signals.closed = true;
        let dropped = signals.subscribers.len();
        for subscriber in signals.subscribers.drain(..) {
            self.handles.remove(&subscriber.handle);
        }
        dropped
    }

    /// Number of live subscriptions across all objects
    pub fn subscription_count(&self) -> usize {
        self.handles.len()
    }

    /// Object a live subscription belongs to
    pub fn owner(&self, handle: SignalHandle) -> Option<ObjectId> {
        self.handles.get(&handle).map(|object| *object.value())
    }

    /// Whether `handle` is still registered
    pub fn is_subscribed(&self, handle: SignalHandle) -> bool {
        self.handles.contains_key(&handle)
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}
