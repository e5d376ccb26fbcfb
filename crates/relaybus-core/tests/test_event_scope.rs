use parking_lot::Mutex;
use relaybus_core::{
    event_args, AffinityDispatcher, BusEvent, EventBus, SubscribeOptions, ThreadDispatcher,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct JobFinished {
    id: String,
    attempts: u32,
}

impl BusEvent for JobFinished {
    const NAME: &'static str = "job.finished";
}

fn recorder() -> (Arc<Mutex<Vec<Vec<Value>>>>, impl Fn(&[Value]) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |args: &[Value]| sink.lock().push(args.to_vec()))
}

#[test]
fn test_publish_reaches_subscriber_once_with_args() {
    let bus = EventBus::new();
    let (seen, handler) = recorder();
    bus.default_scope().on("status", handler);

    assert_eq!(bus.publish("status", event_args!["ready", 1, null]), 1);
    assert_eq!(*seen.lock(), vec![vec![json!("ready"), json!(1), Value::Null]]);
}

#[test]
fn test_once_subscription_fires_at_most_once() {
    let bus = EventBus::new();
    let scope = bus.default_scope();
    let (seen, handler) = recorder();
    scope.subscribe("tick", SubscribeOptions::new().once(), handler);

    for i in 0..5 {
        scope.publish("tick", event_args![i]);
    }
    assert_eq!(*seen.lock(), vec![vec![json!(0)]]);
    assert_eq!(scope.subscriber_count("tick"), 0);
}

#[test]
fn test_sticky_subscriber_replays_last_publish() {
    let bus = EventBus::new();
    let scope = bus.scope("machine");
    scope.publish("state", event_args!["idle"]);
    scope.publish("state", event_args!["running"]);

    let (seen, handler) = recorder();
    scope.subscribe("state", SubscribeOptions::new().sticky(), handler);
    assert_eq!(*seen.lock(), vec![vec![json!("running")]]);

    scope.publish("state", event_args!["done"]);
    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn test_unsubscribe_stops_delivery_and_is_idempotent() {
    let bus = EventBus::new();
    let (seen, handler) = recorder();
    let token = bus.default_scope().on("ping", handler);

    bus.publish("ping", event_args![1]);
    assert!(token.unsubscribe());
    assert!(!token.unsubscribe());
    bus.publish("ping", event_args![2]);

    assert_eq!(*seen.lock(), vec![vec![json!(1)]]);
}

#[test]
fn test_scopes_are_isolated() {
    let bus = EventBus::new();
    let (seen, handler) = recorder();
    bus.scope("a").on("evt", handler);

    bus.scope("b").publish("evt", event_args!["b"]);
    assert!(seen.lock().is_empty());

    bus.scope("a").publish("evt", event_args!["a"]);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(bus.scope_names(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_typed_events() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.default_scope()
        .subscribe_event::<JobFinished, _>(SubscribeOptions::new(), move |event| {
            sink.lock().push(event)
        });

    let event = JobFinished {
        id: "job-7".to_string(),
        attempts: 2,
    };
    assert_eq!(bus.emit(&event).unwrap(), 1);
    assert_eq!(*seen.lock(), vec![event]);
}

#[test]
fn test_once_under_concurrent_publishers() {
    let bus = Arc::new(EventBus::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    bus.default_scope()
        .subscribe("race", SubscribeOptions::new().once(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let barrier = Arc::new(Barrier::new(8));
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let bus = bus.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                bus.publish("race", event_args![]);
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_ui_affinity_runs_on_dispatcher_thread() {
    let dispatcher = Arc::new(ThreadDispatcher::spawn("ui-test").unwrap());
    let ui_thread = dispatcher.thread_id();
    let bus = EventBus::new().with_affinity(dispatcher.clone() as Arc<dyn AffinityDispatcher>);

    let (tx, rx) = mpsc::channel();
    bus.default_scope()
        .subscribe("paint", SubscribeOptions::new().on_ui(), move |args| {
            let _ = tx.send((thread::current().id(), args.to_vec()));
        });

    bus.publish("paint", event_args!["frame-1"]);
    let (thread_id, args) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(thread_id, ui_thread);
    assert_eq!(args, vec![json!("frame-1")]);

    dispatcher.shutdown();
}

#[test]
fn test_panicking_handler_does_not_stop_dispatch() {
    let bus = EventBus::new();
    let panics = Arc::new(Mutex::new(Vec::new()));
    let sink = panics.clone();
    bus.on_handler_panic(move |panic| sink.lock().push(panic.event.clone()));

    let scope = bus.default_scope();
    scope.on("boom", |_| panic!("handler failed"));
    let (seen, handler) = recorder();
    scope.on("boom", handler);

    assert_eq!(scope.publish("boom", event_args![1]), 2);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(*panics.lock(), vec!["boom".to_string()]);
}

#[test]
fn test_affinity_handler_panic_is_reported() {
    let dispatcher = Arc::new(ThreadDispatcher::spawn("ui-panic").unwrap());
    let bus = EventBus::new().with_affinity(dispatcher.clone() as Arc<dyn AffinityDispatcher>);
    let panics = Arc::new(Mutex::new(Vec::new()));
    let sink = panics.clone();
    bus.on_handler_panic(move |panic| sink.lock().push(panic.message.clone()));

    let scope = bus.default_scope();
    scope.subscribe("paint", SubscribeOptions::new().on_ui(), |_| {
        panic!("ui boom")
    });
    let (tx, rx) = mpsc::channel();
    scope.subscribe("paint", SubscribeOptions::new().on_ui(), move |args| {
        let _ = tx.send(args.to_vec());
    });

    assert_eq!(scope.publish("paint", event_args![7]), 2);
    let args = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(args, vec![json!(7)]);
    assert_eq!(*panics.lock(), vec!["ui boom".to_string()]);

    dispatcher.shutdown();
}

#[tokio::test]
async fn test_publish_async_reports_panics() {
    let bus = EventBus::new();
    let panics = Arc::new(Mutex::new(Vec::new()));
    let sink = panics.clone();
    bus.on_handler_panic(move |panic| sink.lock().push(panic.event.clone()));

    bus.default_scope().on("job", |_| panic!("async boom"));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    bus.default_scope().on("job", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(bus.publish_async("job", event_args![]).await.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*panics.lock(), vec!["job".to_string()]);
}

#[tokio::test]
async fn test_publish_async_waits_for_handlers() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let counter = calls.clone();
        bus.default_scope().on("work", move |_| {
            thread::sleep(Duration::from_millis(20));
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    assert_eq!(bus.publish_async("work", event_args![]).await.unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_publish_all_without_remote_is_local() {
    let bus = EventBus::new();
    let (seen, handler) = recorder();
    bus.default_scope().on("local", handler);

    assert!(!bus.is_remote_enabled());
    assert_eq!(bus.publish_all("local", event_args![true]).unwrap(), 1);
    assert!(bus.publish_remote("local", event_args![false]).is_ok());
    assert_eq!(*seen.lock(), vec![vec![json!(true)]]);
}
