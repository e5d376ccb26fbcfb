//! Event scopes.
//!
//! An [`EventScope`] is an isolated namespace of named events. It owns one
//! subscriber list and one sticky cache entry per event name and performs
//! local dispatch.
//!
//! Each event name has its own lock. Publishing caches the arguments and
//! clones the subscriber list under that lock, then invokes handlers with
//! no lock held, so handlers may subscribe, unsubscribe or publish again.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::task::TaskTracker;

use super::events::{BusEvent, HandlerPanic};
use super::subscription::{SubscribeOptions, Subscription, SubscriptionId};
use crate::affinity::AffinityDispatcher;
use crate::error::{CodecError, DispatchError};
use crate::types::{EventArgs, EventHandler, PanicHook};

/// Subscribers and sticky value for one event name
#[derive(Default)]
struct EventSlot {
    subscribers: Vec<Subscription>,
    last: Option<EventArgs>,
}

type SlotHandle = Arc<Mutex<EventSlot>>;

struct ScopeInner {
    name: String,
    slots: RwLock<HashMap<String, SlotHandle>>,
    affinity: Option<Arc<dyn AffinityDispatcher>>,
    panic_hook: RwLock<Option<PanicHook>>,
    tasks: TaskTracker,
    closed: AtomicBool,
}

impl ScopeInner {
    fn slot(&self, event: &str) -> SlotHandle {
        if let Some(slot) = self.slots.read().get(event) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().entry(event.to_string()).or_default())
    }

    fn existing_slot(&self, event: &str) -> Option<SlotHandle> {
        self.slots.read().get(event).cloned()
    }

    /// Store `args` as the sticky value and return the current subscribers.
    fn cache_and_snapshot(&self, event: &str, args: &EventArgs) -> Vec<Subscription> {
        let slot = self.slot(event);
        let mut slot = slot.lock();
        slot.last = Some(Arc::clone(args));
        slot.subscribers.clone()
    }

    /// Whether `args` is still the sticky value of `event`.
    fn is_latest(&self, event: &str, args: &EventArgs) -> bool {
        self.existing_slot(event).is_some_and(|slot| {
            slot.lock()
                .last
                .as_ref()
                .is_some_and(|last| Arc::ptr_eq(last, args))
        })
    }

    fn remove(&self, event: &str, id: SubscriptionId) -> bool {
        let Some(slot) = self.existing_slot(event) else {
            return false;
        };
        let mut slot = slot.lock();
        let before = slot.subscribers.len();
        slot.subscribers.retain(|s| s.id() != id);
        slot.subscribers.len() != before
    }

    /// Take ownership of a once-subscription's single delivery.
    ///
    /// Only the caller that removes it from the list may invoke it.
    fn claim(&self, event: &str, subscription: &Subscription) -> bool {
        !subscription.is_once() || self.remove(event, subscription.id())
    }

    fn needs_marshal(&self, subscription: &Subscription) -> bool {
        subscription.has_ui_affinity()
            && self
                .affinity
                .as_ref()
                .is_some_and(|affinity| !affinity.is_current())
    }

    fn deliver(self: &Arc<Self>, event: &str, subscription: &Subscription, args: &EventArgs) {
        if self.needs_marshal(subscription) {
            if let Some(affinity) = &self.affinity {
                let inner = Arc::clone(self);
                let event = event.to_string();
                let handler = Arc::clone(subscription.handler());
                let args = Arc::clone(args);
                affinity.dispatch(Box::new(move || {
                    inner.invoke(&event, &handler, &args);
                }));
                return;
            }
        }
        self.invoke(event, subscription.handler(), args);
    }

    fn invoke(&self, event: &str, handler: &EventHandler, args: &[Value]) -> bool {
        match catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(()) => true,
            Err(payload) => {
                let report = HandlerPanic::from_payload(&self.name, event, payload.as_ref());
                tracing::error!("{}", report);
                let hook = self.panic_hook.read().clone();
                if let Some(hook) = hook {
                    hook(&report);
                }
                false
            }
        }
    }
}

/// An isolated namespace of named events
///
/// Cheap to clone; clones share the same subscriptions and cache.
#[derive(Clone)]
pub struct EventScope {
    inner: Arc<ScopeInner>,
}

impl EventScope {
    /// Create a standalone scope without an affinity dispatcher
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), None, None)
    }

    /// Create a standalone scope that marshals affinity subscriptions
    pub fn with_affinity(name: impl Into<String>, affinity: Arc<dyn AffinityDispatcher>) -> Self {
        Self::from_parts(name.into(), Some(affinity), None)
    }

    pub(crate) fn from_parts(
        name: String,
        affinity: Option<Arc<dyn AffinityDispatcher>>,
        panic_hook: Option<PanicHook>,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name,
                slots: RwLock::new(HashMap::new()),
                affinity,
                panic_hook: RwLock::new(panic_hook),
                tasks: TaskTracker::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Name of this scope
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Subscribe a handler to `event`
    ///
    /// With `options.sticky`, a cached argument vector is replayed to the
    /// handler before this call returns (on the affinity thread instead if
    /// the subscription has UI affinity and the caller is elsewhere). A
    /// once-subscription satisfied by that replay is never registered.
    ///
    /// The subscription is live before the replay runs, so a publish racing
    /// with this call may reach the handler first. The replay is skipped
    /// when such a publish has already replaced the cached value; a handler
    /// never sees an older value after a newer one from that race.
    pub fn subscribe<F>(&self, event: &str, options: SubscribeOptions, handler: F) -> UnsubscribeToken
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.subscribe_handler(event, options, Arc::new(handler))
    }

    /// Subscribe with default options
    pub fn on<F>(&self, event: &str, handler: F) -> UnsubscribeToken
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.subscribe(event, SubscribeOptions::default(), handler)
    }

    /// Subscribe an already shared handler
    pub fn subscribe_handler(
        &self,
        event: &str,
        options: SubscribeOptions,
        handler: EventHandler,
    ) -> UnsubscribeToken {
        let subscription = Subscription::new(handler, options);
        let slot = self.inner.slot(event);

        let replay = {
            let mut slot = slot.lock();
            let cached = if options.sticky { slot.last.clone() } else { None };
            if !(options.once && cached.is_some()) {
                slot.subscribers.push(subscription.clone());
            }
            cached
        };

        tracing::debug!(
            "Subscription {} added for '{}' in scope '{}'",
            subscription.id(),
            event,
            self.inner.name
        );

        let token = UnsubscribeToken {
            id: subscription.id(),
            event: event.to_string(),
            scope: Arc::downgrade(&self.inner),
            spent: AtomicBool::new(false),
        };

        if let Some(args) = replay {
            if options.once {
                token.spent.store(true, Ordering::Release);
                self.inner.deliver(event, &subscription, &args);
            } else if self.inner.is_latest(event, &args) {
                self.inner.deliver(event, &subscription, &args);
            } else {
                tracing::debug!(
                    "Sticky replay of '{}' skipped: superseded by a newer publish",
                    event
                );
            }
        }

        token
    }

    /// Subscribe a typed handler to `E::NAME`
    ///
    /// Payloads that do not decode as `E` are skipped with a warning.
    pub fn subscribe_event<E, F>(&self, options: SubscribeOptions, handler: F) -> UnsubscribeToken
    where
        E: BusEvent,
        F: Fn(E) + Send + Sync + 'static,
    {
        let scope = self.inner.name.clone();
        self.subscribe(E::NAME, options, move |args| match E::from_args(args) {
            Ok(value) => handler(value),
            Err(e) => tracing::warn!(
                "Skipping '{}' in scope '{}': payload does not decode: {}",
                E::NAME,
                scope,
                e
            ),
        })
    }

    /// Publish `args` to every subscriber of `event`
    ///
    /// Caches `args` as the sticky value, then delivers to a snapshot of the
    /// subscriber list in subscription order. Returns the number of handlers
    /// invoked or handed to the affinity thread.
    pub fn publish(&self, event: &str, args: impl Into<EventArgs>) -> usize {
        let args = args.into();
        let snapshot = self.inner.cache_and_snapshot(event, &args);

        let mut delivered = 0;
        for subscription in &snapshot {
            if !self.inner.claim(event, subscription) {
                continue;
            }
            self.inner.deliver(event, subscription, &args);
            delivered += 1;
        }

        tracing::trace!(
            "Published '{}' in scope '{}' to {} handler(s)",
            event,
            self.inner.name,
            delivered
        );
        delivered
    }

    /// Publish a typed value under `E::NAME`
    pub fn publish_event<E: BusEvent>(&self, value: &E) -> Result<usize, CodecError> {
        Ok(self.publish(E::NAME, value.to_args()?))
    }

    /// Publish and run every handler concurrently
    ///
    /// Same caching and snapshot rules as [`publish`](Self::publish). Each
    /// handler runs as a tracked blocking task; the returned future
    /// resolves once they have all finished. Affinity handlers are handed
    /// to the affinity thread and complete independently.
    pub async fn publish_async(
        &self,
        event: &str,
        args: impl Into<EventArgs>,
    ) -> Result<usize, DispatchError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(DispatchError::ScopeClosed {
                scope: self.inner.name.clone(),
            });
        }

        let args = args.into();
        let snapshot = self.inner.cache_and_snapshot(event, &args);

        let mut dispatched = 0;
        let mut handles = Vec::with_capacity(snapshot.len());
        for subscription in snapshot {
            if !self.inner.claim(event, &subscription) {
                continue;
            }
            dispatched += 1;

            if self.inner.needs_marshal(&subscription) {
                self.inner.deliver(event, &subscription, &args);
                continue;
            }

            let inner = Arc::clone(&self.inner);
            let event = event.to_string();
            let args = Arc::clone(&args);
            handles.push(self.inner.tasks.spawn_blocking(move || {
                inner.invoke(&event, subscription.handler(), &args);
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Dispatch task for '{}' failed: {}", event, e);
            }
        }

        Ok(dispatched)
    }

    /// Remove every subscriber of `event`, keeping its sticky value
    pub fn remove_subscriptions(&self, event: &str) -> usize {
        let removed = self
            .inner
            .existing_slot(event)
            .map(|slot| std::mem::take(&mut slot.lock().subscribers).len())
            .unwrap_or(0);
        tracing::debug!(
            "Removed {} subscription(s) for '{}' in scope '{}'",
            removed,
            event,
            self.inner.name
        );
        removed
    }

    /// Remove every subscriber and every sticky value in this scope
    pub fn remove_all(&self) {
        let slots: Vec<SlotHandle> = self.inner.slots.read().values().cloned().collect();
        for slot in slots {
            let mut slot = slot.lock();
            slot.subscribers.clear();
            slot.last = None;
        }
        tracing::debug!("Cleared scope '{}'", self.inner.name);
    }

    /// Number of live subscriptions for `event`
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner
            .existing_slot(event)
            .map(|slot| slot.lock().subscribers.len())
            .unwrap_or(0)
    }

    /// Whether `event` has at least one live subscription
    pub fn has_subscribers(&self, event: &str) -> bool {
        self.subscriber_count(event) > 0
    }

    /// The most recently published arguments for `event`
    pub fn sticky_value(&self, event: &str) -> Option<EventArgs> {
        self.inner
            .existing_slot(event)
            .and_then(|slot| slot.lock().last.clone())
    }

    /// Forget the sticky value for `event`
    pub fn clear_sticky(&self, event: &str) -> Option<EventArgs> {
        self.inner
            .existing_slot(event)
            .and_then(|slot| slot.lock().last.take())
    }

    /// Event names with subscribers or a sticky value, sorted
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| {
                let slot = slot.lock();
                !slot.subscribers.is_empty() || slot.last.is_some()
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Install the diagnostic callback for panicking handlers
    pub fn set_panic_hook(&self, hook: Option<PanicHook>) {
        *self.inner.panic_hook.write() = hook;
    }

    /// Number of `publish_async` handlers still running
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Refuse further async dispatch and wait for in-flight handlers
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        tracing::debug!("Scope '{}' shut down", self.inner.name);
    }
}

impl std::fmt::Debug for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScope")
            .field("name", &self.inner.name)
            .field("events", &self.inner.slots.read().len())
            .field("affinity", &self.inner.affinity.is_some())
            .finish()
    }
}

/// Token that removes exactly one subscription
///
/// Dropping the token leaves the subscription in place.
pub struct UnsubscribeToken {
    id: SubscriptionId,
    event: String,
    scope: Weak<ScopeInner>,
    spent: AtomicBool,
}

impl UnsubscribeToken {
    /// Remove the subscription
    ///
    /// Returns true if this call removed it. Later calls are no-ops.
    pub fn unsubscribe(&self) -> bool {
        if self.spent.swap(true, Ordering::AcqRel) {
            return false;
        }
        let Some(scope) = self.scope.upgrade() else {
            return false;
        };
        let removed = scope.remove(&self.event, self.id);
        if removed {
            tracing::debug!(
                "Subscription {} removed from '{}' in scope '{}'",
                self.id,
                self.event,
                scope.name
            );
        }
        removed
    }

    /// Id of the subscription this token controls
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Event name the subscription is registered under
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether the token has already been used
    pub fn is_spent(&self) -> bool {
        self.spent.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for UnsubscribeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsubscribeToken")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("spent", &self.is_spent())
            .finish()
    }
}
