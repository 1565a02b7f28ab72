#![cfg(feature = "bus")]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Notify;
use xorigin::bus::{
    connect, handler, host, BusError, BusOptions, ConnectionState, CrossOriginBus, EventBus,
    LocalBus,
};
use xorigin::codec::{BlockEncoding, CodecError, WireMessage};
use xorigin::transport::{Realm, TransportError};

const HOST_ORIGIN: &str = "http://host.example.org";

fn increment_hub() -> Arc<LocalBus> {
    let hub = Arc::new(LocalBus::new());
    hub.on(
        "ping",
        handler(|args| async move {
            let n = args.first().and_then(Value::as_i64).unwrap_or_default();
            Ok(Some(json!(n + 1)))
        }),
    );
    hub
}

fn frame_realm(bus: &CrossOriginBus) -> Realm<WireMessage> {
    bus.frame().expect("host bus owns a frame").realm().clone()
}

async fn expect_pending<F: std::future::Future>(future: F) {
    let waited = tokio::time::timeout(Duration::from_millis(100), future).await;
    assert!(waited.is_err(), "future should still be pending");
}

#[tokio::test]
async fn keyed_ping_from_allowed_subdomain() {
    let realm = Realm::new(HOST_ORIGIN);
    let options = BusOptions::new(["http://*.example.com"]).with_key("k");
    let parent = host(&realm, "http://sub.example.com/widget", options, increment_hub()).unwrap();

    let child = connect(
        &frame_realm(&parent),
        BusOptions::new([HOST_ORIGIN]).with_key("k"),
        Arc::new(LocalBus::new()),
    )
    .unwrap();

    assert_eq!(child.fire("ping", &(41,)).await.unwrap(), Some(json!(42)));
    assert_eq!(parent.state(), ConnectionState::Connected);
    assert_eq!(parent.remote_origin().as_deref(), Some("http://sub.example.com"));
}

#[tokio::test]
async fn connect_from_foreign_origin_is_ignored() {
    let realm = Realm::new(HOST_ORIGIN);
    let options = BusOptions::new(["http://*.example.com"]).with_key("k");
    let parent = host(&realm, "http://evil.com/widget", options, increment_hub()).unwrap();

    let child = connect(
        &frame_realm(&parent),
        BusOptions::open().with_key("k").with_reply_timeout(None),
        Arc::new(LocalBus::new()),
    )
    .unwrap();

    expect_pending(child.fire("ping", &(41,))).await;
    assert_eq!(parent.state(), ConnectionState::Connecting);
    assert_eq!(realm.listener_count(), 1);
    assert!(parent.remote_origin().is_none());
}

#[tokio::test]
async fn dropped_call_times_out_when_configured() {
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(
        &realm,
        "http://sub.example.com",
        BusOptions::open().with_key("right"),
        increment_hub(),
    )
    .unwrap();

    let limit = Duration::from_millis(50);
    let child = connect(
        &frame_realm(&parent),
        BusOptions::open()
            .with_key("wrong")
            .with_reply_timeout(Some(limit)),
        Arc::new(LocalBus::new()),
    )
    .unwrap();

    let err = child.fire("ping", &(1,)).await.unwrap_err();
    assert!(matches!(err, BusError::Timeout(d) if d == limit));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn calls_issued_before_connect_dispatch_in_order() {
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(
        &realm,
        "http://child.example.com",
        BusOptions::open(),
        Arc::new(LocalBus::new()),
    )
    .unwrap();

    let calls: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| parent.fire("record", &(name,)))
        .collect();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let child_hub = Arc::new(LocalBus::new());
    let recorder = Arc::clone(&seen);
    child_hub.on(
        "record",
        handler(move |args| {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().unwrap().extend(args);
                Ok(None)
            }
        }),
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(parent.state(), ConnectionState::Connecting);
    assert!(seen.lock().unwrap().is_empty());

    let _child = connect(&frame_realm(&parent), BusOptions::open(), child_hub).unwrap();
    for call in calls {
        assert_eq!(call.await.unwrap(), None);
    }
    assert_eq!(
        *seen.lock().unwrap(),
        vec![json!("a"), json!("b"), json!("c")]
    );
}

#[tokio::test]
async fn replies_arriving_out_of_order_resolve_their_own_calls() {
    let release = Arc::new(Notify::new());
    let hub = Arc::new(LocalBus::new());
    let gate = Arc::clone(&release);
    hub.on(
        "a",
        handler(move |_| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok(Some(json!("reply-a")))
            }
        }),
    );
    hub.on("b", handler(|_| async { Ok(Some(json!("reply-b"))) }));

    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(&realm, "http://child.example.com", BusOptions::open(), hub).unwrap();
    let child = connect(&frame_realm(&parent), BusOptions::open(), Arc::new(LocalBus::new()))
        .unwrap();

    let slow = tokio::spawn(child.fire("a", &()));
    assert_eq!(child.fire("b", &()).await.unwrap(), Some(json!("reply-b")));
    assert!(!slow.is_finished());

    release.notify_one();
    assert_eq!(slow.await.unwrap().unwrap(), Some(json!("reply-a")));
}

#[tokio::test]
async fn call_from_untrusted_origin_gets_no_reply() {
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(
        &realm,
        "http://child.example.com",
        BusOptions::open().with_reply_timeout(Some(Duration::from_millis(50))),
        Arc::new(LocalBus::new()),
    )
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let child_hub = Arc::new(LocalBus::new());
    child_hub.on(
        "secret",
        handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some(json!("leaked"))) }
        }),
    );
    // The hosted side trusts some other host only.
    let child = connect(
        &frame_realm(&parent),
        BusOptions::new(["http://trusted.example.org"]),
        child_hub,
    )
    .unwrap();
    parent.ready().await.unwrap();

    let err = parent.fire("secret", &()).await.unwrap_err();
    assert!(matches!(err, BusError::Timeout(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(child.state(), ConnectionState::Connected);
    assert_eq!(parent.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn handler_rejection_is_forwarded() {
    let hub = Arc::new(LocalBus::new());
    hub.on(
        "save",
        handler(|_| async { Err(json!({"reason": "quota exceeded"})) }),
    );
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(&realm, "http://child.example.com", BusOptions::open(), hub).unwrap();
    let child = connect(&frame_realm(&parent), BusOptions::open(), Arc::new(LocalBus::new()))
        .unwrap();

    match child.fire("save", &(json!({"doc": 1}),)).await {
        Err(BusError::Remote(reason)) => assert_eq!(reason, json!({"reason": "quota exceeded"})),
        other => panic!("expected remote rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn non_serializable_argument_fails_before_sending() {
    let hub = Arc::new(LocalBus::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    hub.on(
        "x",
        handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        }),
    );
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(&realm, "http://child.example.com", BusOptions::open(), hub).unwrap();
    let child = connect(&frame_realm(&parent), BusOptions::open(), Arc::new(LocalBus::new()))
        .unwrap();

    let mut unkeyable = BTreeMap::new();
    unkeyable.insert((1, 2), "pair");
    let err = child.fire("x", &(unkeyable,)).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, BusError::Codec(CodecError::NotSerializable(_))));
    assert!(err.to_string().contains("must be serializable"));

    // A later call overtakes nothing: the failed one was never queued.
    assert_eq!(child.fire("x", &()).await.unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispose_is_idempotent_and_fails_fast() {
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(
        &realm,
        "http://child.example.com",
        BusOptions::open(),
        Arc::new(LocalBus::new()),
    )
    .unwrap();
    let child_realm = frame_realm(&parent);
    let queued = parent.fire("never", &());

    parent.dispose();
    parent.dispose();

    assert_eq!(parent.state(), ConnectionState::Disposed);
    assert!(matches!(queued.await, Err(BusError::Disposed)));
    assert!(matches!(parent.fire("late", &()).await, Err(BusError::Disposed)));
    assert!(matches!(parent.emit("late", &()).await, Err(BusError::Disposed)));
    assert!(child_realm.parent().is_none());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(realm.listener_count(), 0);
}

#[tokio::test]
async fn disposing_one_side_closes_the_main_port() {
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(&realm, "http://child.example.com", BusOptions::open(), increment_hub())
        .unwrap();
    let child = connect(&frame_realm(&parent), BusOptions::open(), Arc::new(LocalBus::new()))
        .unwrap();
    parent.ready().await.unwrap();

    child.dispose();
    let err = parent.fire("anything", &()).await.unwrap_err();
    assert!(matches!(
        err,
        BusError::Transport(TransportError::PortClosed(_))
    ));
    assert_eq!(parent.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn independently_keyed_buses_do_not_cross_wire() {
    let realm = Realm::new(HOST_ORIGIN);

    let first_hub = Arc::new(LocalBus::new());
    first_hub.on("who", handler(|_| async { Ok(Some(json!("first"))) }));
    let second_hub = Arc::new(LocalBus::new());
    second_hub.on("who", handler(|_| async { Ok(Some(json!("second"))) }));

    let first = host(
        &realm,
        "http://child.example.com/one",
        BusOptions::open().with_key("one"),
        first_hub,
    )
    .unwrap();
    let second = host(
        &realm,
        "http://child.example.com/two",
        BusOptions::open().with_key("two"),
        second_hub,
    )
    .unwrap();

    let to_second = connect(
        &frame_realm(&second),
        BusOptions::open().with_key("two"),
        Arc::new(LocalBus::new()),
    )
    .unwrap();
    let to_first = connect(
        &frame_realm(&first),
        BusOptions::open().with_key("one"),
        Arc::new(LocalBus::new()),
    )
    .unwrap();

    assert_eq!(to_second.fire("who", &()).await.unwrap(), Some(json!("second")));
    assert_eq!(to_first.fire("who", &()).await.unwrap(), Some(json!("first")));
}

#[tokio::test]
async fn latin1_buses_interoperate_within_range() {
    let hub = Arc::new(LocalBus::new());
    hub.on(
        "echo",
        handler(|args| async move { Ok(args.into_iter().next()) }),
    );
    let options = BusOptions::open().with_encoding(BlockEncoding::Latin1);
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(&realm, "http://child.example.com", options.clone(), hub).unwrap();
    let child = connect(&frame_realm(&parent), options, Arc::new(LocalBus::new())).unwrap();

    assert_eq!(
        child.fire("echo", &("café",)).await.unwrap(),
        Some(json!("café"))
    );

    let err = child.fire("echo", &("✓",)).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        BusError::Codec(CodecError::Unrepresentable { unit: 0x2713, .. })
    ));
}

#[tokio::test]
async fn bus_can_be_injected_as_event_bus() {
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(&realm, "http://child.example.com", BusOptions::open(), increment_hub())
        .unwrap();
    let child = connect(&frame_realm(&parent), BusOptions::open(), Arc::new(LocalBus::new()))
        .unwrap();

    let remote: Arc<dyn EventBus> = Arc::new(child);
    assert_eq!(remote.fire("ping", vec![json!(9)]).await, Ok(Some(json!(10))));
}

#[tokio::test]
async fn nested_values_survive_a_call() {
    let hub = Arc::new(LocalBus::new());
    hub.on(
        "echo",
        handler(|args| async move { Ok(Some(Value::Array(args))) }),
    );
    let realm = Realm::new(HOST_ORIGIN);
    let parent = host(&realm, "http://child.example.com", BusOptions::open(), hub).unwrap();
    let child = connect(&frame_realm(&parent), BusOptions::open(), Arc::new(LocalBus::new()))
        .unwrap();

    let payload = json!({
        "none": null,
        "list": [1, [2, [3, []]], {"deep": {"er": true}}],
        "text": "snowman ☃ and 𝄞",
        "max": i64::MAX,
        "tiny": 5e-324,
        "sum": 0.1 + 0.2,
    });
    let reply = child.fire("echo", &(payload.clone(), Value::Null)).await.unwrap();
    assert_eq!(reply, Some(json!([payload, null])));
}
