mod helpers;

use std::time::Duration;

use amarra_core::store::keys;
use amarra_core::{KvStore, Message, PublishOptions};

use helpers::{NAMESPACE, test_queue};

fn past_deadline() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .saturating_sub(5)
}

/// Plant a message the way a worker that crashed mid-handling would leave it:
/// sitting in the processing list with a registered, already-expired claim.
async fn plant_orphan(store: &dyn KvStore, topic: &str, msg: &Message) -> Vec<u8> {
    let raw = serde_json::to_vec(msg).unwrap();
    store
        .push_back(&keys::processing(NAMESPACE, topic), &raw)
        .await
        .unwrap();
    store
        .zadd(&keys::claims(NAMESPACE), past_deadline(), &raw)
        .await
        .unwrap();
    raw
}

#[tokio::test]
async fn orphaned_claim_is_requeued_with_one_retry_charged() {
    let (queue, store) = test_queue();
    let msg = Message::new("jobs", b"work".to_vec(), &PublishOptions::default());
    plant_orphan(store.as_ref(), "jobs", &msg).await;

    queue.start().unwrap();

    let ready = keys::ready(NAMESPACE, "jobs");
    for _ in 0..50 {
        if store.list_len(&ready).await.unwrap() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let raws = store.list_range(&ready, 0, -1).await.unwrap();
    assert_eq!(raws.len(), 1, "orphan must be swept back to the ready list");
    let requeued: Message = serde_json::from_slice(&raws[0]).unwrap();
    assert_eq!(requeued.id, msg.id);
    assert_eq!(requeued.retry, 1, "the lost attempt counts against the budget");

    assert_eq!(
        store.list_len(&keys::processing(NAMESPACE, "jobs")).await.unwrap(),
        0
    );
    assert!(
        store
            .zrange_by_score(&keys::claims(NAMESPACE), u64::MAX)
            .await
            .unwrap()
            .is_empty(),
        "the expired claim is consumed by the sweep"
    );

    queue.stop().await.unwrap();
}

#[tokio::test]
async fn stale_claim_for_a_completed_message_is_discarded() {
    let (queue, store) = test_queue();

    // Claim entry with no processing-list counterpart: the worker finished in
    // time and only lost the race to deregister.
    let msg = Message::new("jobs", b"done".to_vec(), &PublishOptions::default());
    let raw = serde_json::to_vec(&msg).unwrap();
    store
        .zadd(&keys::claims(NAMESPACE), past_deadline(), &raw)
        .await
        .unwrap();

    queue.start().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(
        store
            .zrange_by_score(&keys::claims(NAMESPACE), u64::MAX)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        store.list_len(&keys::ready(NAMESPACE, "jobs")).await.unwrap(),
        0,
        "a completed message must not be redelivered by the sweep"
    );
    assert_eq!(
        store.list_len(&keys::dead_letter(NAMESPACE, "jobs")).await.unwrap(),
        0
    );

    queue.stop().await.unwrap();
}

#[tokio::test]
async fn orphan_with_spent_retry_budget_is_dead_lettered() {
    let (queue, store) = test_queue();

    let opts = PublishOptions {
        max_retry: 1,
        ..Default::default()
    };
    let mut msg = Message::new("jobs", b"work".to_vec(), &opts);
    msg.retry = 1;
    plant_orphan(store.as_ref(), "jobs", &msg).await;

    queue.start().unwrap();

    let dead = keys::dead_letter(NAMESPACE, "jobs");
    for _ in 0..50 {
        if store.list_len(&dead).await.unwrap() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let raws = store.list_range(&dead, 0, -1).await.unwrap();
    assert_eq!(raws.len(), 1);
    let buried: Message = serde_json::from_slice(&raws[0]).unwrap();
    assert_eq!(buried.retry, 2);
    assert_eq!(
        store.list_len(&keys::ready(NAMESPACE, "jobs")).await.unwrap(),
        0
    );

    queue.stop().await.unwrap();
}
