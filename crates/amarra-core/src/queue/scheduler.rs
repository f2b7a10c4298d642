use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::message::{self, DEFAULT_MAX_RETRY, Message};
use crate::store::{KvStore, keys};

/// Delay-scheduler loop: each tick promotes due delayed messages into their
/// ready lists and sweeps expired claims back out of the processing lists.
/// Both the `publish_with_delay` path and the retry-reschedule path feed the
/// same delay structure, so this one loop serves both.
pub(crate) async fn run(
    store: Arc<dyn KvStore>,
    config: QueueConfig,
    mut cancel: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(Duration::from_millis(config.scheduler_tick_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("delay scheduler started");

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = tick.tick() => {
                promote_due(store.as_ref(), &config.namespace).await;
                reclaim_expired(store.as_ref(), &config.namespace).await;
            }
        }
    }

    info!("delay scheduler stopped");
}

/// Drain every delayed entry whose due time has passed and republish it to
/// its topic's ready list. The drain is a single atomic pop-by-score, so an
/// overlapping tick can never observe (and double-publish) the same entry.
async fn promote_due(store: &dyn KvStore, namespace: &str) {
    let now_s = message::epoch_ms() / 1_000;
    let due = match store.zpop_by_score(&keys::delayed(namespace), now_s).await {
        Ok(due) => due,
        Err(e) => {
            warn!(error = %e, "failed to drain delay set");
            return;
        }
    };

    for raw in due {
        let mut msg: Message = match serde_json::from_slice(&raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "dropping undecodable delayed entry");
                continue;
            }
        };
        msg.scheduled_at_ms = None;

        let ready_raw = match serde_json::to_vec(&msg) {
            Ok(ready_raw) => ready_raw,
            Err(e) => {
                warn!(msg_id = %msg.id, error = %e, "failed to re-serialize delayed message");
                continue;
            }
        };
        match store.push_back(&keys::ready(namespace, &msg.topic), &ready_raw).await {
            Ok(()) => debug!(topic = %msg.topic, msg_id = %msg.id, "promoted delayed message"),
            Err(e) => {
                error!(topic = %msg.topic, msg_id = %msg.id, error = %e, "failed to promote delayed message");
                // Re-stage the original entry so the next tick retries it
                let _ = store.zadd(&keys::delayed(namespace), now_s, &raw).await;
            }
        }
    }
}

/// Sweep claims whose ack deadline has lapsed. An entry still present in its
/// topic's processing list belonged to a worker that crashed or stalled: it
/// is removed, charged one retry, and requeued (or dead-lettered once the
/// budget is exhausted). An entry already gone from the processing list was
/// completed by its worker in time; the stale claim is simply discarded.
async fn reclaim_expired(store: &dyn KvStore, namespace: &str) {
    let now_s = message::epoch_ms() / 1_000;
    let expired = match store.zpop_by_score(&keys::claims(namespace), now_s).await {
        Ok(expired) => expired,
        Err(e) => {
            warn!(error = %e, "failed to drain claims set");
            return;
        }
    };

    for raw in expired {
        let mut msg: Message = match serde_json::from_slice(&raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "dropping undecodable claim entry");
                continue;
            }
        };

        let processing = keys::processing(namespace, &msg.topic);
        let removed = match store.remove_value(&processing, &raw).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(topic = %msg.topic, msg_id = %msg.id, error = %e, "failed to check orphaned claim");
                // The claim was already popped; re-stage it for the next tick
                let _ = store.zadd(&keys::claims(namespace), now_s, &raw).await;
                continue;
            }
        };
        if removed == 0 {
            continue;
        }

        msg.retry += 1;
        msg.scheduled_at_ms = None;
        let max_retry = if msg.max_retry == 0 {
            DEFAULT_MAX_RETRY
        } else {
            msg.max_retry
        };
        let exhausted = msg.retry > max_retry;
        let dest = if exhausted {
            keys::dead_letter(namespace, &msg.topic)
        } else {
            keys::ready(namespace, &msg.topic)
        };

        let updated = match serde_json::to_vec(&msg) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(msg_id = %msg.id, error = %e, "failed to serialize reclaimed message");
                continue;
            }
        };
        if let Err(e) = store.push_back(&dest, &updated).await {
            error!(topic = %msg.topic, msg_id = %msg.id, error = %e, "failed to requeue orphaned claim");
            continue;
        }
        warn!(
            topic = %msg.topic,
            msg_id = %msg.id,
            retry = msg.retry,
            exhausted,
            "reclaimed orphaned claim"
        );
    }
}
