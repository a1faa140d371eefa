//! Consume-and-forward scenarios against a local HTTP endpoint
//!
//! The stream side is a `ChannelSource`; the downstream side is a real
//! `HttpForwarder` talking to a `TestServer` over loopback.

use http_forward::{
    ChannelSink, DispatchError, Dispatcher, DispatcherConfig, ForwardError, ForwardStatus,
    ForwardTask, HttpForwarder, HttpForwarderConfig, OverflowPolicy, Url,
};
use kafka_http_bridge::testing::{unreachable_url, ChannelSource, TestServer};
use kafka_http_bridge::{run_bridge, BridgeError};
use kafka_source::{Error as SourceError, PartitionKey, Record};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_test::assert_ok;

const TEST_TIMEOUT: Duration = Duration::from_secs(30);

fn dispatcher_for(
    url: Url,
    max_in_flight: usize,
    overflow_policy: OverflowPolicy,
) -> (
    Dispatcher<HttpForwarder>,
    mpsc::UnboundedReceiver<ForwardTask>,
) {
    let forwarder = HttpForwarder::new(HttpForwarderConfig {
        request_timeout: Duration::from_secs(60),
        ..HttpForwarderConfig::new(url)
    })
    .unwrap();
    let (sink, reports) = ChannelSink::new();
    let dispatcher = Dispatcher::new(
        forwarder,
        std::sync::Arc::new(sink),
        DispatcherConfig {
            max_in_flight,
            overflow_policy,
        },
    )
    .unwrap();
    (dispatcher, reports)
}

fn stop_signal() -> (oneshot::Sender<()>, impl std::future::Future<Output = ()>) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, async move {
        let _ = rx.await;
    })
}

fn chat(offset: i64, text: &str) -> Record {
    Record::new("chat-messages", 0, offset, json!({"data": {"text": text}}))
}

fn partition_zero() -> PartitionKey {
    PartitionKey {
        topic: "chat-messages".to_string(),
        partition: 0,
    }
}

#[tokio::test]
async fn test_record_forwarded_and_committed() {
    let mut server = TestServer::start(200, Duration::ZERO).await.unwrap();
    let (tx, mut source) = ChannelSource::new(16);
    let closed = source.closed_flag();
    let positions = source.positions();
    let (dispatcher, mut reports) = dispatcher_for(server.url.clone(), 4, OverflowPolicy::Block);
    let (stop, shutdown) = stop_signal();

    tx.send(Ok(chat(0, "hello"))).await.unwrap();

    let driver = async {
        let body = server.next_body().await.unwrap();
        assert_eq!(body, json!({"data": {"text": "hello"}}));

        let task = reports.recv().await.unwrap();
        assert_eq!(task.status(), &ForwardStatus::Succeeded { status: 200 });
        assert_eq!(task.payload(), &json!({"data": {"text": "hello"}}));

        stop.send(()).unwrap();
    };

    let bridge = run_bridge(&mut source, &dispatcher, shutdown, Duration::from_secs(5));
    let (summary, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(bridge, driver) })
        .await
        .unwrap();

    let summary = assert_ok!(summary);
    assert_eq!(summary.received, 1);
    assert_eq!(summary.forwards.succeeded(), 1);
    assert_eq!(positions.committed(&partition_zero()), Some(1));
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unreachable_downstream_still_commits() {
    let url = unreachable_url().await.unwrap();
    let (tx, mut source) = ChannelSource::new(16);
    let positions = source.positions();
    let (dispatcher, mut reports) = dispatcher_for(url, 4, OverflowPolicy::Block);
    let (stop, shutdown) = stop_signal();

    tx.send(Ok(chat(0, "hello"))).await.unwrap();
    tx.send(Ok(chat(1, "still there?"))).await.unwrap();

    let driver = async {
        for _ in 0..2 {
            let task = reports.recv().await.unwrap();
            assert!(
                matches!(task.error(), Some(ForwardError::Connect(_))),
                "unexpected status {:?}",
                task.status()
            );
        }
        stop.send(()).unwrap();
    };

    let bridge = run_bridge(&mut source, &dispatcher, shutdown, Duration::from_secs(5));
    let (summary, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(bridge, driver) })
        .await
        .unwrap();

    let summary = assert_ok!(summary);
    assert_eq!(summary.received, 2);
    assert_eq!(summary.forwards.failed(), 2);
    assert_eq!(summary.forwards.succeeded(), 0);
    // Forward failures never hold back the position.
    assert_eq!(positions.committed(&partition_zero()), Some(2));
}

#[tokio::test]
async fn test_in_flight_forwards_bounded_under_load() {
    const RECORDS: usize = 1000;
    const LIMIT: usize = 50;

    let mut server = TestServer::start(200, Duration::from_millis(20))
        .await
        .unwrap();
    let (tx, mut source) = ChannelSource::new(64);
    let (dispatcher, mut reports) = dispatcher_for(server.url.clone(), LIMIT, OverflowPolicy::Block);
    let (stop, shutdown) = stop_signal();

    let producer = tokio::spawn(async move {
        for i in 0..RECORDS {
            let record = Record::new("chat-messages", (i % 3) as i32, i as i64, json!({"n": i}));
            if tx.send(Ok(record)).await.is_err() {
                break;
            }
        }
    });

    let driver = async {
        let mut ids = HashSet::new();
        let mut payloads = HashSet::new();
        while ids.len() < RECORDS {
            let task = reports.recv().await.unwrap();
            assert_eq!(task.status(), &ForwardStatus::Succeeded { status: 200 });
            assert!(ids.insert(task.id()), "task {} reported twice", task.id());
            payloads.insert(task.payload()["n"].as_u64().unwrap());
        }
        assert_eq!(payloads.len(), RECORDS);
        stop.send(()).unwrap();
    };

    let bridge = run_bridge(&mut source, &dispatcher, shutdown, Duration::from_secs(5));
    let (summary, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(bridge, driver) })
        .await
        .unwrap();
    producer.await.unwrap();

    let summary = assert_ok!(summary);
    assert_eq!(summary.received, RECORDS as u64);
    assert_eq!(summary.forwards.submitted(), RECORDS as u64);
    assert_eq!(summary.forwards.succeeded(), RECORDS as u64);
    assert_eq!(summary.forwards.max_in_flight_observed(), LIMIT as u64);
    assert!(server.stats().max_active() <= LIMIT);
    assert_eq!(server.drain_bodies().len(), RECORDS);
}

#[tokio::test]
async fn test_drop_new_sheds_load() {
    let server = TestServer::start(200, Duration::from_millis(300))
        .await
        .unwrap();
    let (tx, mut source) = ChannelSource::new(16);
    let (dispatcher, mut reports) = dispatcher_for(server.url.clone(), 2, OverflowPolicy::DropNew);
    let (stop, shutdown) = stop_signal();

    for i in 0..5 {
        tx.send(Ok(chat(i, "burst"))).await.unwrap();
    }

    let driver = async {
        for _ in 0..5 {
            reports.recv().await.unwrap();
        }
        stop.send(()).unwrap();
    };

    let bridge = run_bridge(&mut source, &dispatcher, shutdown, Duration::from_secs(5));
    let (summary, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(bridge, driver) })
        .await
        .unwrap();

    let summary = assert_ok!(summary);
    assert_eq!(summary.received, 5);
    assert_eq!(summary.forwards.succeeded(), 2);
    assert_eq!(summary.forwards.dropped(), 3);
    assert!(server.stats().max_active() <= 2);
}

#[tokio::test]
async fn test_interrupt_abandons_slow_forwards_after_grace() {
    let server = TestServer::start(200, Duration::from_secs(20)).await.unwrap();
    let (tx, mut source) = ChannelSource::new(16);
    let closed = source.closed_flag();
    let (dispatcher, mut reports) = dispatcher_for(server.url.clone(), 50, OverflowPolicy::Block);
    let (stop, shutdown) = stop_signal();

    for i in 0..10 {
        tx.send(Ok(chat(i, "slow"))).await.unwrap();
    }

    let driver = async {
        while server.stats().received() < 10 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop.send(()).unwrap();
    };

    let started = Instant::now();
    let bridge = run_bridge(&mut source, &dispatcher, shutdown, Duration::from_millis(200));
    let (summary, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(bridge, driver) })
        .await
        .unwrap();

    let summary = assert_ok!(summary);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(summary.received, 10);
    assert_eq!(summary.forwards.abandoned(), 10);
    assert_eq!(summary.forwards.in_flight(), 0);
    assert!(closed.load(Ordering::SeqCst));

    // Every task ended exactly once, none left pending.
    let mut ids = HashSet::new();
    while let Ok(task) = reports.try_recv() {
        assert_eq!(task.error(), Some(&ForwardError::Abandoned));
        assert!(ids.insert(task.id()));
    }
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn test_interrupt_lets_forwards_finish_within_grace() {
    let mut server = TestServer::start(200, Duration::from_millis(100))
        .await
        .unwrap();
    let (tx, mut source) = ChannelSource::new(16);
    let (dispatcher, _reports) = dispatcher_for(server.url.clone(), 50, OverflowPolicy::Block);
    let (stop, shutdown) = stop_signal();

    for i in 0..10 {
        tx.send(Ok(chat(i, "quick"))).await.unwrap();
    }

    let driver = async {
        while server.stats().received() < 10 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stop.send(()).unwrap();
    };

    let bridge = run_bridge(&mut source, &dispatcher, shutdown, Duration::from_secs(10));
    let (summary, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(bridge, driver) })
        .await
        .unwrap();

    let summary = assert_ok!(summary);
    assert_eq!(summary.forwards.succeeded(), 10);
    assert_eq!(summary.forwards.abandoned(), 0);
    assert_eq!(server.drain_bodies().len(), 10);
}

#[tokio::test]
async fn test_interrupt_while_waiting_for_slot_abandons_record() {
    let server = TestServer::start(200, Duration::from_secs(20)).await.unwrap();
    let (tx, mut source) = ChannelSource::new(16);
    let positions = source.positions();
    let (dispatcher, mut reports) = dispatcher_for(server.url.clone(), 1, OverflowPolicy::Block);
    let (stop, shutdown) = stop_signal();

    tx.send(Ok(chat(0, "in flight"))).await.unwrap();
    tx.send(Ok(chat(1, "waiting for a slot"))).await.unwrap();

    let driver = async {
        while server.stats().received() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Let the loop take the second record and block on the full slot pool.
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(()).unwrap();
    };

    let bridge = run_bridge(&mut source, &dispatcher, shutdown, Duration::from_millis(100));
    let (summary, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(bridge, driver) })
        .await
        .unwrap();

    let summary = assert_ok!(summary);
    assert_eq!(summary.received, 2);
    assert_eq!(summary.interrupted, 1);
    assert_eq!(summary.forwards.submitted(), summary.received);
    assert_eq!(summary.forwards.abandoned(), 2);
    assert_eq!(positions.committed(&partition_zero()), Some(2));

    let mut texts = HashSet::new();
    while let Ok(task) = reports.try_recv() {
        assert_eq!(task.error(), Some(&ForwardError::Abandoned));
        let text = task.payload()["data"]["text"].as_str().unwrap().to_string();
        assert!(texts.insert(text));
    }
    assert_eq!(texts.len(), 2);
    assert!(texts.contains("waiting for a slot"));
    assert_eq!(server.stats().received(), 1);
}

#[tokio::test]
async fn test_drop_oldest_reports_every_record_once() {
    const RECORDS: i64 = 6;

    let server = TestServer::start(200, Duration::from_millis(300))
        .await
        .unwrap();
    let (tx, mut source) = ChannelSource::new(16);
    let (dispatcher, mut reports) =
        dispatcher_for(server.url.clone(), 2, OverflowPolicy::DropOldest);
    let (stop, shutdown) = stop_signal();

    for i in 0..RECORDS {
        tx.send(Ok(chat(i, &format!("message {i}")))).await.unwrap();
    }

    let driver = async {
        let mut ids = HashSet::new();
        let mut delivered = HashSet::new();
        let mut dropped = HashSet::new();
        while ids.len() < RECORDS as usize {
            let task = reports.recv().await.unwrap();
            assert!(ids.insert(task.id()), "task {} reported twice", task.id());
            let text = task.payload()["data"]["text"].as_str().unwrap().to_string();
            match task.status() {
                ForwardStatus::Succeeded { .. } => assert!(delivered.insert(text)),
                ForwardStatus::Failed(ForwardError::Dropped) => assert!(dropped.insert(text)),
                other => panic!("unexpected status {other:?}"),
            }
        }
        stop.send(()).unwrap();
        (delivered, dropped)
    };

    let bridge = run_bridge(&mut source, &dispatcher, shutdown, Duration::from_secs(5));
    let (summary, (delivered, dropped)) =
        tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(bridge, driver) })
            .await
            .unwrap();

    let summary = assert_ok!(summary);
    assert_eq!(summary.received, RECORDS as u64);
    assert_eq!(summary.forwards.submitted(), RECORDS as u64);
    assert_eq!(summary.forwards.dropped(), 4);
    assert_eq!(summary.forwards.succeeded(), 2);
    assert!(summary.forwards.max_in_flight_observed() <= 2);

    // The newest records survive; everything older was evicted.
    let expected: HashSet<String> = ["message 4", "message 5"].map(String::from).into();
    assert_eq!(delivered, expected);
    assert_eq!(dropped.len(), 4);
}

#[tokio::test]
async fn test_undecodable_record_is_skipped() {
    let mut server = TestServer::start(200, Duration::ZERO).await.unwrap();
    let (tx, mut source) = ChannelSource::new(16);
    let (dispatcher, _reports) = dispatcher_for(server.url.clone(), 4, OverflowPolicy::Block);
    let (stop, shutdown) = stop_signal();

    let bad = Record::decode(
        "chat-messages",
        0,
        0,
        None,
        None,
        Some(b"not json".as_slice()),
    )
    .unwrap_err();
    tx.send(Err(SourceError::Decode(bad))).await.unwrap();
    tx.send(Ok(chat(1, "after the bad one"))).await.unwrap();

    let driver = async {
        let body = server.next_body().await.unwrap();
        assert_eq!(body["data"]["text"], "after the bad one");
        stop.send(()).unwrap();
    };

    let bridge = run_bridge(&mut source, &dispatcher, shutdown, Duration::from_secs(5));
    let (summary, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(bridge, driver) })
        .await
        .unwrap();

    let summary = assert_ok!(summary);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.received, 1);
}

#[tokio::test]
async fn test_broken_subscription_aborts_loop() {
    let server = TestServer::start(200, Duration::from_millis(50)).await.unwrap();
    let (tx, mut source) = ChannelSource::new(16);
    let closed = source.closed_flag();
    let (dispatcher, mut reports) = dispatcher_for(server.url.clone(), 4, OverflowPolicy::Block);

    tx.send(Ok(chat(0, "before the outage"))).await.unwrap();
    tx.send(Err(SourceError::Connect("broker went away".to_string())))
        .await
        .unwrap();

    let result = tokio::time::timeout(
        TEST_TIMEOUT,
        run_bridge(
            &mut source,
            &dispatcher,
            std::future::pending::<()>(),
            Duration::from_secs(5),
        ),
    )
    .await
    .unwrap();

    let err = result.unwrap_err();
    assert!(matches!(err, BridgeError::Connection(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(closed.load(Ordering::SeqCst));

    // The forward started before the failure was still drained.
    let task = reports.recv().await.unwrap();
    assert_eq!(task.status(), &ForwardStatus::Succeeded { status: 200 });
    assert!(matches!(
        dispatcher.submit(json!({})).await,
        Err(DispatchError::Closed)
    ));
}
