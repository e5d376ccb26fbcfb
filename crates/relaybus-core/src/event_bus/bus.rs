//! Event Bus implementation.
//!
//! [`EventBus`] is the registry of named [`EventScope`]s and the facade for
//! local, remote and combined publishing. It is an ordinary value: create
//! one at startup, share it by `Arc`, and tests can build as many isolated
//! buses as they like.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::events::{BusEvent, HandlerPanic};
use super::scope::EventScope;
use crate::affinity::AffinityDispatcher;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::remote::RemoteTransport;
use crate::types::{EventArgs, InboundCallback, PanicHook};

/// Name of the scope used when none is given
pub const DEFAULT_SCOPE: &str = "default";

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Scope used by the unscoped publish operations.
    pub default_scope: String,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            default_scope: DEFAULT_SCOPE.to_string(),
        }
    }
}

/// Registry of event scopes with local and remote publishing
pub struct EventBus {
    /// Scopes by name, created on first access
    scopes: RwLock<HashMap<String, EventScope>>,
    /// Configuration
    config: EventBusConfig,
    /// Affinity dispatcher handed to every scope
    affinity: Option<Arc<dyn AffinityDispatcher>>,
    /// Panic hook handed to every scope
    panic_hook: RwLock<Option<PanicHook>>,
    /// Bridge to other processes, installed at most once
    remote: OnceCell<Arc<dyn RemoteTransport>>,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
            config,
            affinity: None,
            panic_hook: RwLock::new(None),
            remote: OnceCell::new(),
        }
    }

    /// Marshal UI-affinity subscriptions through `dispatcher`
    pub fn with_affinity(mut self, dispatcher: Arc<dyn AffinityDispatcher>) -> Self {
        self.affinity = Some(dispatcher);
        self
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Name of the default scope
    pub fn default_scope_name(&self) -> &str {
        &self.config.default_scope
    }

    /// Get the scope called `name`, creating it on first use
    pub fn scope(&self, name: &str) -> EventScope {
        if let Some(scope) = self.scopes.read().get(name) {
            return scope.clone();
        }

        let mut scopes = self.scopes.write();
        scopes
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating scope '{}'", name);
                EventScope::from_parts(
                    name.to_string(),
                    self.affinity.clone(),
                    self.panic_hook.read().clone(),
                )
            })
            .clone()
    }

    /// Get the default scope
    pub fn default_scope(&self) -> EventScope {
        self.scope(&self.config.default_scope)
    }

    /// Names of every scope created so far, sorted
    pub fn scope_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scopes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Report panicking handlers in every scope to `hook`
    pub fn on_handler_panic<F>(&self, hook: F)
    where
        F: Fn(&HandlerPanic) + Send + Sync + 'static,
    {
        let hook: PanicHook = Arc::new(hook);
        *self.panic_hook.write() = Some(Arc::clone(&hook));
        for scope in self.scopes.read().values() {
            scope.set_panic_hook(Some(Arc::clone(&hook)));
        }
    }

    /// Publish to local subscribers of the default scope
    pub fn publish(&self, event: &str, args: impl Into<EventArgs>) -> usize {
        self.default_scope().publish(event, args)
    }

    /// Publish to local subscribers concurrently
    pub async fn publish_async(&self, event: &str, args: impl Into<EventArgs>) -> Result<usize> {
        Ok(self.default_scope().publish_async(event, args).await?)
    }

    /// Send to other processes only, bypassing local subscribers
    ///
    /// A no-op when no bridge is enabled.
    pub fn publish_remote(&self, event: &str, args: impl Into<EventArgs>) -> Result<()> {
        self.publish_remote_in(&self.config.default_scope, event, args)
    }

    /// Send to other processes, waiting for outbound queue space
    pub async fn publish_remote_async(
        &self,
        event: &str,
        args: impl Into<EventArgs>,
    ) -> Result<()> {
        let Some(remote) = self.remote.get() else {
            tracing::trace!("Remote publish of '{}' skipped: bridge disabled", event);
            return Ok(());
        };
        let args = args.into();
        let envelope = Envelope::new(self.config.default_scope.as_str(), event, &args);
        remote.broadcast_async(&envelope).await
    }

    /// Send to other processes from a named scope
    pub fn publish_remote_in(
        &self,
        scope: &str,
        event: &str,
        args: impl Into<EventArgs>,
    ) -> Result<()> {
        let Some(remote) = self.remote.get() else {
            tracing::trace!("Remote publish of '{}' skipped: bridge disabled", event);
            return Ok(());
        };
        let args = args.into();
        remote.broadcast(&Envelope::new(scope, event, &args))
    }

    /// Publish locally and send to other processes
    ///
    /// Local delivery always happens; an error reports only a failure to
    /// queue the remote copy.
    pub fn publish_all(&self, event: &str, args: impl Into<EventArgs>) -> Result<usize> {
        let scope = self.config.default_scope.clone();
        self.publish_all_in(&scope, event, args)
    }

    /// Publish locally and remotely from a named scope
    pub fn publish_all_in(
        &self,
        scope: &str,
        event: &str,
        args: impl Into<EventArgs>,
    ) -> Result<usize> {
        let args = args.into();
        let delivered = self.scope(scope).publish(event, Arc::clone(&args));
        self.publish_remote_in(scope, event, args)?;
        Ok(delivered)
    }

    /// Async counterpart of [`publish_all`](Self::publish_all)
    pub async fn publish_all_async(
        &self,
        event: &str,
        args: impl Into<EventArgs>,
    ) -> Result<usize> {
        let args = args.into();
        let delivered = self.publish_async(event, Arc::clone(&args)).await?;
        self.publish_remote_async(event, args).await?;
        Ok(delivered)
    }

    /// Publish a typed value locally
    pub fn emit<E: BusEvent>(&self, value: &E) -> Result<usize> {
        Ok(self.publish(E::NAME, value.to_args()?))
    }

    /// Send a typed value to other processes only
    pub fn emit_remote<E: BusEvent>(&self, value: &E) -> Result<()> {
        self.publish_remote(E::NAME, value.to_args()?)
    }

    /// Publish a typed value locally and remotely
    pub fn emit_all<E: BusEvent>(&self, value: &E) -> Result<usize> {
        self.publish_all(E::NAME, value.to_args()?)
    }

    /// Publish a typed value to local subscribers concurrently
    pub async fn emit_async<E: BusEvent>(&self, value: &E) -> Result<usize> {
        let args = value.to_args()?;
        self.publish_async(E::NAME, args).await
    }

    /// Install a remote transport, once
    ///
    /// The first call runs `connect` with the callback that feeds decoded
    /// envelopes back into this bus. Later calls return the installed
    /// transport without running their `connect`. Disabling is not
    /// supported.
    pub async fn enable_remote_with<F, Fut>(
        self: &Arc<Self>,
        connect: F,
    ) -> Result<Arc<dyn RemoteTransport>>
    where
        F: FnOnce(InboundCallback) -> Fut,
        Fut: Future<Output = Result<Arc<dyn RemoteTransport>>>,
    {
        if let Some(remote) = self.remote.get() {
            tracing::debug!("Remote already enabled at {}", remote.endpoint());
            return Ok(Arc::clone(remote));
        }

        let inbound = self.inbound_callback();
        let remote = self
            .remote
            .get_or_try_init(|| async move {
                let remote = connect(inbound).await?;
                tracing::info!(
                    "Remote enabled as {} at {}",
                    remote.role(),
                    remote.endpoint()
                );
                Ok::<_, crate::error::Error>(remote)
            })
            .await?;
        Ok(Arc::clone(remote))
    }

    /// The installed remote transport, if any
    pub fn remote(&self) -> Option<Arc<dyn RemoteTransport>> {
        self.remote.get().cloned()
    }

    /// Whether a remote transport is installed
    pub fn is_remote_enabled(&self) -> bool {
        self.remote.initialized()
    }

    /// Callback that republishes decoded envelopes into this bus
    ///
    /// Holds only a weak reference, so a transport owned by the bus does
    /// not keep the bus alive.
    pub fn inbound_callback(self: &Arc<Self>) -> InboundCallback {
        let bus = Arc::downgrade(self);
        Arc::new(move |envelope: Envelope| {
            let Some(bus) = bus.upgrade() else {
                tracing::debug!("Inbound '{}' dropped: bus is gone", envelope.message_name);
                return;
            };
            let (scope, event, args) = envelope.into_parts();
            bus.scope(&scope).publish(&event, args);
        })
    }

    /// Stop the remote transport and wait for in-flight async dispatches
    pub async fn shutdown(&self) {
        if let Some(remote) = self.remote.get() {
            remote.shutdown().await;
        }
        let scopes: Vec<EventScope> = self.scopes.read().values().cloned().collect();
        for scope in scopes {
            scope.shutdown().await;
        }
        tracing::debug!("Event bus shut down");
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("scopes", &self.scope_names())
            .field("config", &self.config)
            .field("remote", &self.remote.get().map(|r| r.endpoint()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TransportError};
    use crate::event_args;
    use crate::event_bus::SubscribeOptions;
    use crate::remote::Role;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records envelopes instead of sending them
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Envelope>>,
        reject: bool,
    }

    #[async_trait]
    impl RemoteTransport for RecordingTransport {
        fn broadcast(&self, envelope: &Envelope) -> Result<()> {
            if self.reject {
                return Err(TransportError::QueueFull { capacity: 0 }.into());
            }
            self.sent.lock().push(envelope.clone());
            Ok(())
        }

        async fn broadcast_async(&self, envelope: &Envelope) -> Result<()> {
            self.broadcast(envelope)
        }

        fn role(&self) -> Role {
            Role::Hub
        }

        fn endpoint(&self) -> String {
            "memory".to_string()
        }

        async fn shutdown(&self) {}
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct JobFinished {
        id: String,
        exit_code: i32,
    }

    impl BusEvent for JobFinished {
        const NAME: &'static str = "jobs.finished";
    }

    #[test]
    fn test_scope_is_get_or_create() {
        let bus = EventBus::new();
        let a = bus.scope("tools");
        a.on("x", |_| {});
        let b = bus.scope("tools");
        assert_eq!(b.subscriber_count("x"), 1);
        assert_eq!(bus.scope_names(), vec!["tools".to_string()]);
        assert_eq!(bus.default_scope().name(), DEFAULT_SCOPE);
    }

    #[test]
    fn test_scopes_are_isolated() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        bus.scope("one").on("ping", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.scope("two").publish("ping", event_args![]);
        bus.publish("ping", event_args![]);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        bus.scope("one").publish("ping", event_args![]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_publish_remote_without_bridge_is_noop() {
        let bus = EventBus::new();
        assert!(!bus.is_remote_enabled());
        assert!(bus.publish_remote("x", event_args![]).is_ok());
        assert_eq!(bus.publish_all("x", event_args![]).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remote_routing() {
        let bus = Arc::new(EventBus::new());
        let transport = Arc::new(RecordingTransport::default());
        let installed = transport.clone();
        bus.enable_remote_with(|_| async move { Ok(installed as Arc<dyn RemoteTransport>) })
            .await
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        bus.default_scope().on("evt", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish_remote("evt", event_args![1]).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        bus.publish("evt", event_args![2]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert_eq!(bus.publish_all("evt", event_args![3]).unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], Envelope::new("default", "evt", &[json!(1)]));
        assert_eq!(sent[1].args, vec![json!(3)]);
    }

    #[tokio::test]
    async fn test_enable_remote_is_idempotent() {
        let bus = Arc::new(EventBus::new());
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let remote = bus
                .enable_remote_with(|_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(RecordingTransport::default()) as Arc<dyn RemoteTransport>)
                })
                .await
                .unwrap();
            assert_eq!(remote.endpoint(), "memory");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_enable_can_be_retried() {
        let bus = Arc::new(EventBus::new());
        let err = bus
            .enable_remote_with(|_| async { Err(Error::other("no network")) })
            .await;
        assert!(err.is_err());
        assert!(!bus.is_remote_enabled());

        bus.enable_remote_with(|_| async {
            Ok(Arc::new(RecordingTransport::default()) as Arc<dyn RemoteTransport>)
        })
        .await
        .unwrap();
        assert!(bus.is_remote_enabled());
    }

    #[tokio::test]
    async fn test_publish_all_reports_remote_failure_after_local_delivery() {
        let bus = Arc::new(EventBus::new());
        bus.enable_remote_with(|_| async {
            Ok(Arc::new(RecordingTransport {
                reject: true,
                ..Default::default()
            }) as Arc<dyn RemoteTransport>)
        })
        .await
        .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        bus.default_scope().on("evt", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let err = bus.publish_all("evt", event_args![]).unwrap_err();
        assert!(err.is_transport_error());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inbound_callback_republishes_into_scope() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.scope("tools").on("resize", move |args| s.lock().push(args.to_vec()));

        let inbound = bus.inbound_callback();
        inbound(Envelope::new("tools", "resize", &[json!(640), json!(480)]));
        assert_eq!(*seen.lock(), vec![vec![json!(640), json!(480)]]);
        assert!(bus.scope("tools").sticky_value("resize").is_some());
    }

    #[test]
    fn test_typed_emit_and_subscribe() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.default_scope()
            .subscribe_event::<JobFinished, _>(SubscribeOptions::new(), move |job| {
                s.lock().push(job)
            });

        let job = JobFinished {
            id: "job-7".to_string(),
            exit_code: 0,
        };
        assert_eq!(bus.emit(&job).unwrap(), 1);
        assert_eq!(*seen.lock(), vec![job]);
    }

    #[test]
    fn test_typed_handler_skips_undecodable_payload() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        bus.default_scope()
            .subscribe_event::<JobFinished, _>(SubscribeOptions::new(), move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });

        assert_eq!(bus.publish(JobFinished::NAME, event_args!["not a job"]), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_hook_reaches_existing_and_new_scopes() {
        let bus = EventBus::new();
        bus.scope("early").on("boom", |_| panic!("early"));

        let reports = Arc::new(Mutex::new(Vec::new()));
        let r = reports.clone();
        bus.on_handler_panic(move |report| r.lock().push(report.scope.clone()));

        bus.scope("late").on("boom", |_| panic!("late"));
        bus.scope("early").publish("boom", event_args![]);
        bus.scope("late").publish("boom", event_args![]);

        assert_eq!(*reports.lock(), vec!["early".to_string(), "late".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_scopes() {
        let bus = EventBus::new();
        let scope = bus.scope("work");
        let _ = bus.default_scope();
        bus.shutdown().await;
        assert!(scope.is_closed());

        let err = bus.publish_async("x", event_args![]).await.unwrap_err();
        assert!(err.is_closed());
    }
}
