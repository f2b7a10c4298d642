use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::message::{self, Message, SubscribeOptions};
use crate::queue::Handler;
use crate::store::{KvStore, keys};

/// Everything one worker loop needs; each of a subscription's `concurrency`
/// workers gets its own copy (the handler and store are shared via `Arc`).
pub(crate) struct WorkerContext {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) namespace: String,
    pub(crate) topic: String,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) options: SubscribeOptions,
    pub(crate) claim_block: Duration,
}

/// Worker loop: claim one message at a time by atomically moving it from the
/// ready list to the processing list, invoke the handler, then acknowledge or
/// reschedule. The blocking claim is the only suspension point, so the loop
/// observes cancellation within one `claim_block` interval.
pub(crate) async fn run(ctx: WorkerContext, mut cancel: watch::Receiver<bool>, worker_id: usize) {
    let ready = keys::ready(&ctx.namespace, &ctx.topic);
    let processing = keys::processing(&ctx.namespace, &ctx.topic);
    debug!(topic = %ctx.topic, worker_id, "worker started");

    loop {
        if *cancel.borrow() {
            break;
        }
        // Biased toward the claim: if a claim completes in the same poll as a
        // cancellation, the claimed entry must still be processed (dropping it
        // would strand it in the processing list with no claim registered).
        let claimed = tokio::select! {
            biased;
            claimed = ctx.store.move_blocking(&ready, &processing, ctx.claim_block) => claimed,
            _ = cancel.changed() => break,
        };
        match claimed {
            Ok(Some(raw)) => process_claim(&ctx, &processing, raw).await,
            Ok(None) => {}
            Err(e) => {
                warn!(topic = %ctx.topic, error = %e, "claim failed, backing off");
                tokio::select! {
                    _ = cancel.changed() => break,
                    _ = tokio::time::sleep(ctx.claim_block) => {}
                }
            }
        }
    }

    debug!(topic = %ctx.topic, worker_id, "worker stopped");
}

/// Handle one claimed message. `raw` is the exact serialized form sitting in
/// the processing list; it identifies the entry for removal, so it must not
/// be re-serialized before the entry is cleared.
async fn process_claim(ctx: &WorkerContext, processing: &str, raw: Vec<u8>) {
    let claims = keys::claims(&ctx.namespace);
    let ack_timeout = ctx
        .options
        .ack_timeout
        .unwrap_or(SubscribeOptions::DEFAULT_ACK_TIMEOUT);

    // Register the claim so a crashed worker's message is swept back to the
    // ready list once the ack timeout lapses.
    let deadline_s = (message::epoch_ms() + ack_timeout.as_millis() as u64).div_ceil(1_000);
    if let Err(e) = ctx.store.zadd(&claims, deadline_s, &raw).await {
        warn!(topic = %ctx.topic, error = %e, "failed to register claim");
    }

    let mut msg: Message = match serde_json::from_slice(&raw) {
        Ok(msg) => msg,
        Err(e) => {
            // Corrupt payloads are unrecoverable: drop immediately, never retry.
            warn!(topic = %ctx.topic, error = %e, "dropping undecodable claimed message");
            clear_claim(ctx, processing, &claims, &raw).await;
            return;
        }
    };
    msg.scheduled_at_ms = None;

    let result = match ctx.options.ack_timeout {
        Some(limit) => match tokio::time::timeout(limit, ctx.handler.handle(msg.clone())).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("handler exceeded ack timeout of {limit:?}")),
        },
        None => ctx.handler.handle(msg.clone()).await,
    };

    match result {
        Ok(()) => {
            debug!(topic = %ctx.topic, msg_id = %msg.id, "message acknowledged");
            clear_claim(ctx, processing, &claims, &raw).await;
        }
        Err(handler_err) => {
            msg.retry += 1;
            let max_retry = if msg.max_retry == 0 {
                ctx.options.max_retry
            } else {
                msg.max_retry
            };

            if msg.retry <= max_retry {
                let backoff = msg.backoff();
                let scheduled_ms = message::epoch_ms() + backoff.as_millis() as u64;
                msg.scheduled_at_ms = Some(scheduled_ms);
                msg.delay_ms = backoff.as_millis() as u64;
                let updated = match serde_json::to_vec(&msg) {
                    Ok(updated) => updated,
                    Err(e) => {
                        error!(topic = %ctx.topic, msg_id = %msg.id, error = %e, "failed to serialize retry");
                        clear_claim(ctx, processing, &claims, &raw).await;
                        return;
                    }
                };
                if let Err(e) = ctx
                    .store
                    .zadd(
                        &keys::delayed(&ctx.namespace),
                        scheduled_ms.div_ceil(1_000),
                        &updated,
                    )
                    .await
                {
                    // Leave the processing entry and its claim in place: the
                    // claim sweep requeues it after the ack timeout.
                    error!(topic = %ctx.topic, msg_id = %msg.id, error = %e, "failed to reschedule");
                    return;
                }
                warn!(
                    topic = %ctx.topic,
                    msg_id = %msg.id,
                    retry = msg.retry,
                    delay_ms = msg.delay_ms,
                    error = %handler_err,
                    "handler failed, rescheduled with backoff"
                );
            } else {
                msg.scheduled_at_ms = None;
                match serde_json::to_vec(&msg) {
                    Ok(updated) => {
                        if let Err(e) = ctx
                            .store
                            .push_back(&keys::dead_letter(&ctx.namespace, &ctx.topic), &updated)
                            .await
                        {
                            error!(topic = %ctx.topic, msg_id = %msg.id, error = %e, "failed to dead-letter");
                            return;
                        }
                    }
                    Err(e) => {
                        error!(topic = %ctx.topic, msg_id = %msg.id, error = %e, "failed to serialize dead-letter entry");
                    }
                }
                warn!(
                    topic = %ctx.topic,
                    msg_id = %msg.id,
                    retry = msg.retry,
                    max_retry,
                    error = %handler_err,
                    "retries exhausted, message dead-lettered"
                );
            }
            clear_claim(ctx, processing, &claims, &raw).await;
        }
    }
}

/// Remove the claimed entry from the processing list and deregister its
/// claim. A zero-count removal means the claim sweep got there first; the
/// message will be redelivered (at-least-once).
async fn clear_claim(ctx: &WorkerContext, processing: &str, claims: &str, raw: &[u8]) {
    match ctx.store.remove_value(processing, raw).await {
        Ok(0) => debug!(topic = %ctx.topic, "processing entry already reclaimed"),
        Ok(_) => {}
        Err(e) => warn!(topic = %ctx.topic, error = %e, "failed to clear processing entry"),
    }
    if let Err(e) = ctx.store.zrem(claims, raw).await {
        warn!(topic = %ctx.topic, error = %e, "failed to deregister claim");
    }
}
