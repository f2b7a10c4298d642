mod helpers;

use std::collections::HashSet;
use std::time::Duration;

use uuid::Uuid;

use amarra_core::store::keys;
use amarra_core::{KvStore, Message, PublishOptions, SubscribeOptions};

use helpers::{NAMESPACE, recording_handler, test_queue};

#[tokio::test]
async fn publish_then_consume_round_trip() {
    let (queue, store) = test_queue();
    queue.start().unwrap();

    let (handler, mut received) = recording_handler();
    queue
        .subscribe("orders", handler, SubscribeOptions::default())
        .unwrap();

    let mut opts = PublishOptions::default();
    opts.headers.insert("tenant".to_string(), "acme".to_string());
    queue.publish("orders", b"payload".to_vec(), &opts).await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .expect("message must be delivered")
        .unwrap();
    assert_eq!(msg.topic, "orders");
    assert_eq!(msg.payload, b"payload");
    assert_eq!(msg.headers.get("tenant").map(String::as_str), Some("acme"));
    assert_eq!(msg.retry, 0);

    // The acknowledged message leaves the processing list
    let processing = keys::processing(NAMESPACE, "orders");
    for _ in 0..50 {
        if store.list_len(&processing).await.unwrap() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(store.list_len(&processing).await.unwrap(), 0);

    queue.stop().await.unwrap();
}

#[tokio::test]
async fn batch_assigns_unique_ids_where_missing() {
    let (queue, store) = test_queue();

    let blank = |topic: &str| Message {
        id: Uuid::nil(),
        topic: topic.to_string(),
        payload: b"b".to_vec(),
        headers: Default::default(),
        metadata: Default::default(),
        retry: 0,
        max_retry: 0,
        delay_ms: 0,
        created_at_ms: 0,
        scheduled_at_ms: None,
    };
    let batch = vec![blank("a"), blank("a"), blank("b"), blank("b"), blank("b")];
    queue.publish_batch(batch).await.unwrap();

    let mut ids = HashSet::new();
    let mut total = 0;
    for topic in ["a", "b"] {
        let raws = store
            .list_range(&keys::ready(NAMESPACE, topic), 0, -1)
            .await
            .unwrap();
        for raw in raws {
            let msg: Message = serde_json::from_slice(&raw).unwrap();
            assert!(!msg.id.is_nil());
            assert!(msg.created_at_ms > 0);
            ids.insert(msg.id);
            total += 1;
        }
    }
    assert_eq!(total, 5);
    assert_eq!(ids.len(), 5, "every message got a distinct id");
}

#[tokio::test]
async fn concurrent_workers_each_claim_a_message_exactly_once() {
    let (queue, _store) = test_queue();
    queue.start().unwrap();

    let (handler, mut received) = recording_handler();
    queue
        .subscribe(
            "burst",
            handler,
            SubscribeOptions {
                concurrency: 4,
                ..Default::default()
            },
        )
        .unwrap();

    let opts = PublishOptions::default();
    for i in 0..20u8 {
        queue.publish("burst", vec![i], &opts).await.unwrap();
    }

    let mut seen = HashSet::new();
    for _ in 0..20 {
        let msg = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .expect("all messages must be delivered")
            .unwrap();
        assert!(seen.insert(msg.id), "message {} delivered twice", msg.id);
    }

    // No stray redeliveries behind the 20 expected ones
    let extra = tokio::time::timeout(Duration::from_millis(500), received.recv()).await;
    assert!(extra.is_err(), "no message may be claimed by two workers");

    queue.stop().await.unwrap();
}
