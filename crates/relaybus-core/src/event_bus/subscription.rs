//! Subscription records and delivery options.

use uuid::Uuid;

use crate::types::EventHandler;

/// Subscription handle identifying one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Delivery options chosen at subscribe time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Remove the subscription after its first delivery.
    pub once: bool,
    /// Deliver on the scope's affinity thread.
    pub ui_affinity: bool,
    /// Replay the last published arguments at subscribe time.
    pub sticky: bool,
}

impl SubscribeOptions {
    /// Options for a plain, persistent subscription
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver at most once
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Deliver on the affinity thread
    pub fn on_ui(mut self) -> Self {
        self.ui_affinity = true;
        self
    }

    /// Replay the cached arguments immediately, if any
    pub fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }
}

/// One registered handler and its delivery options
///
/// Immutable once created. Owned by the subscriber list of the scope it
/// was registered in.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    handler: EventHandler,
    once: bool,
    ui_affinity: bool,
}

impl Subscription {
    pub(crate) fn new(handler: EventHandler, options: SubscribeOptions) -> Self {
        Self {
            id: SubscriptionId::new(),
            handler,
            once: options.once,
            ui_affinity: options.ui_affinity,
        }
    }

    /// Unique id of this subscription
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the subscription fires at most once
    pub fn is_once(&self) -> bool {
        self.once
    }

    /// Whether delivery is marshaled onto the affinity thread
    pub fn has_ui_affinity(&self) -> bool {
        self.ui_affinity
    }

    pub(crate) fn handler(&self) -> &EventHandler {
        &self.handler
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("once", &self.once)
            .field("ui_affinity", &self.ui_affinity)
            .finish_non_exhaustive()
    }
}
