mod helpers;

use std::time::{Duration, Instant};

use amarra_core::store::keys;
use amarra_core::{KvStore, Message, PublishOptions, SubscribeOptions};

use helpers::{NAMESPACE, recording_handler, test_queue};

#[tokio::test]
async fn delayed_message_arrives_after_its_delay() {
    let (queue, _store) = test_queue();
    queue.start().unwrap();

    let (handler, mut received) = recording_handler();
    queue
        .subscribe("reminders", handler, SubscribeOptions::default())
        .unwrap();

    let delay = Duration::from_secs(2);
    let published_at = Instant::now();
    queue
        .publish_with_delay("reminders", b"later".to_vec(), delay, &PublishOptions::default())
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(10), received.recv())
        .await
        .expect("delayed message must eventually arrive")
        .unwrap();
    let elapsed = published_at.elapsed();

    assert!(elapsed >= delay, "delivered {elapsed:?} in, before the {delay:?} delay");
    // Seconds-resolution scheduling rounds up, plus one scheduler tick of slack
    assert!(elapsed < delay + Duration::from_secs(2), "delivery lagged: {elapsed:?}");
    assert_eq!(msg.payload, b"later");
    assert_eq!(msg.delay_ms, delay.as_millis() as u64);
    assert!(msg.scheduled_at_ms.is_none(), "promotion clears the schedule mark");

    queue.stop().await.unwrap();
}

#[tokio::test]
async fn delayed_message_stays_out_of_the_ready_list_until_due() {
    let (queue, store) = test_queue();
    queue.start().unwrap();

    queue
        .publish_with_delay(
            "reminders",
            b"later".to_vec(),
            Duration::from_secs(30),
            &PublishOptions::default(),
        )
        .await
        .unwrap();

    // Let several scheduler ticks pass well before the due time
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(
        store.list_len(&keys::ready(NAMESPACE, "reminders")).await.unwrap(),
        0,
        "nothing may be promoted early"
    );
    let staged = store
        .zrange_by_score(&keys::delayed(NAMESPACE), u64::MAX)
        .await
        .unwrap();
    assert_eq!(staged.len(), 1);
    let msg: Message = serde_json::from_slice(&staged[0]).unwrap();
    assert!(msg.scheduled_at_ms.is_some());

    queue.stop().await.unwrap();
}
