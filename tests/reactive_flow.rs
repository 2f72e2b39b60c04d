//! End-to-end flow over the public API: open a subscription, feed wire
//! frames through the dispatcher, observe callback invocations, dispose.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde_json::{json, Value as JsonValue};

use resolink::{
    ChangeMessage, Dispatcher, EventHandlers, ObserverRegistry, ObserverUnsubscriber,
    ReactiveResponse, Result, SubscriptionLifecycle, UpdateCallback,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Records unsubscribe calls instead of talking to a server.
struct RecordingUnsubscriber {
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
}

impl RecordingUnsubscriber {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl ObserverUnsubscriber for RecordingUnsubscriber {
    fn unsubscribe<'a>(
        &'a self,
        observer_id: &'a str,
        subscriber_id: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((observer_id.to_string(), subscriber_id.to_string()));
            Ok(())
        })
    }
}

fn recording_callback() -> (UpdateCallback, Arc<Mutex<Vec<Vec<JsonValue>>>>) {
    let seen: Arc<Mutex<Vec<Vec<JsonValue>>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let callback: UpdateCallback = Arc::new(move |items: &[JsonValue]| {
        seen_clone.lock().unwrap().push(items.to_vec());
    });
    (callback, seen)
}

fn wire_frame(observer: &str, op: &str, item: JsonValue, order: usize) -> ChangeMessage {
    serde_json::from_value(json!({
        "observer": observer,
        "msg": op,
        "item": item,
        "order": order,
        "primary_key": "id"
    }))
    .unwrap()
}

#[tokio::test]
async fn subscription_receives_diffs_until_disposed() {
    init_logging();

    let registry = ObserverRegistry::new();
    let unsubscriber = RecordingUnsubscriber::new();
    let lifecycle =
        SubscriptionLifecycle::new(registry.clone(), Arc::clone(&unsubscriber) as Arc<dyn ObserverUnsubscriber>, "session-1");
    let dispatcher = Dispatcher::new(registry.clone(), EventHandlers::new());

    let (callback, seen) = recording_callback();
    let handle = lifecycle
        .open_reactive(
            || async {
                Ok(ReactiveResponse {
                    observer: "obs-1".to_string(),
                    items: vec![json!({"id": 1, "name": "first"})],
                })
            },
            callback,
        )
        .await
        .unwrap();

    assert_eq!(handle.observer_id(), "obs-1");
    assert_eq!(handle.items(), &[json!({"id": 1, "name": "first"})]);

    // Server appends a second item, rewrites the first, then removes it.
    dispatcher.route(&wire_frame("obs-1", "added", json!({"id": 2, "name": "second"}), 1));
    dispatcher.route(&wire_frame("obs-1", "changed", json!({"id": 1, "name": "renamed"}), 0));
    dispatcher.route(&wire_frame("obs-1", "removed", json!({"id": 1}), 0));

    {
        let calls = seen.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            vec![json!({"id": 1, "name": "first"}), json!({"id": 2, "name": "second"})]
        );
        assert_eq!(
            calls[1],
            vec![json!({"id": 1, "name": "renamed"}), json!({"id": 2, "name": "second"})]
        );
        assert_eq!(calls[2], vec![json!({"id": 2, "name": "second"})]);
    }
    assert_eq!(
        registry.items("obs-1").unwrap(),
        vec![json!({"id": 2, "name": "second"})]
    );

    // Disposal removes the entry; a late in-flight frame is dropped.
    handle.dispose().await;
    dispatcher.route(&wire_frame("obs-1", "added", json!({"id": 3}), 0));

    assert!(registry.is_empty());
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(unsubscriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        unsubscriber.seen.lock().unwrap()[0],
        ("obs-1".to_string(), "session-1".to_string())
    );
}

#[tokio::test]
async fn repeated_disposal_notifies_the_server_once() {
    init_logging();

    let registry = ObserverRegistry::new();
    let unsubscriber = RecordingUnsubscriber::new();
    let lifecycle =
        SubscriptionLifecycle::new(registry.clone(), Arc::clone(&unsubscriber) as Arc<dyn ObserverUnsubscriber>, "session-1");

    let (callback, _seen) = recording_callback();
    let handle = lifecycle
        .open_reactive(
            || async {
                Ok(ReactiveResponse {
                    observer: "obs-1".to_string(),
                    items: Vec::new(),
                })
            },
            callback,
        )
        .await
        .unwrap();

    handle.dispose().await;
    handle.dispose().await;
    drop(handle);
    tokio::task::yield_now().await;

    assert_eq!(unsubscriber.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn two_subscriptions_are_isolated() {
    init_logging();

    let registry = ObserverRegistry::new();
    let unsubscriber = RecordingUnsubscriber::new();
    let lifecycle =
        SubscriptionLifecycle::new(registry.clone(), Arc::clone(&unsubscriber) as Arc<dyn ObserverUnsubscriber>, "session-1");
    let dispatcher = Dispatcher::new(registry.clone(), EventHandlers::new());

    let (callback_a, seen_a) = recording_callback();
    let (callback_b, seen_b) = recording_callback();
    let a = lifecycle
        .open_reactive(
            || async {
                Ok(ReactiveResponse {
                    observer: "obs-a".to_string(),
                    items: Vec::new(),
                })
            },
            callback_a,
        )
        .await
        .unwrap();
    let _b = lifecycle
        .open_reactive(
            || async {
                Ok(ReactiveResponse {
                    observer: "obs-b".to_string(),
                    items: Vec::new(),
                })
            },
            callback_b,
        )
        .await
        .unwrap();

    dispatcher.route(&wire_frame("obs-a", "added", json!({"id": 1}), 0));

    assert_eq!(seen_a.lock().unwrap().len(), 1);
    assert!(seen_b.lock().unwrap().is_empty());
    assert_eq!(registry.items("obs-b").unwrap(), Vec::<JsonValue>::new());

    // Disposing one leaves the other live.
    a.dispose().await;
    dispatcher.route(&wire_frame("obs-b", "added", json!({"id": 2}), 0));
    assert_eq!(seen_b.lock().unwrap().len(), 1);
    assert!(registry.contains("obs-b"));
}

#[tokio::test]
async fn clearing_all_subscriptions_unsubscribes_each_observer() {
    init_logging();

    let registry = ObserverRegistry::new();
    let unsubscriber = RecordingUnsubscriber::new();
    let lifecycle =
        SubscriptionLifecycle::new(registry.clone(), Arc::clone(&unsubscriber) as Arc<dyn ObserverUnsubscriber>, "session-1");

    let mut handles = Vec::new();
    for observer in ["obs-a", "obs-b", "obs-c"] {
        let (callback, _seen) = recording_callback();
        let observer = observer.to_string();
        let handle = lifecycle
            .open_reactive(
                move || async move {
                    Ok(ReactiveResponse {
                        observer,
                        items: Vec::new(),
                    })
                },
                callback,
            )
            .await
            .unwrap();
        handles.push(handle);
    }

    assert_eq!(registry.len(), 3);
    lifecycle.clear_all().await;

    assert!(registry.is_empty());
    assert_eq!(unsubscriber.calls.load(Ordering::SeqCst), 3);
    let mut observers: Vec<String> = unsubscriber
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|(observer, _)| observer.clone())
        .collect();
    observers.sort();
    assert_eq!(observers, vec!["obs-a", "obs-b", "obs-c"]);
}
