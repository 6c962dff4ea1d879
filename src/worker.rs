use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::embeddings::EmbeddingStrategy;
use crate::request::EmbedRequest;
use crate::response::EmbedResponse;

/// Reply from a worker, tagged with the slot it frees and the epoch of the
/// worker that produced it. A reply whose epoch no longer matches the slot
/// came from a replaced worker and must not free anything.
pub(crate) struct WorkerReply {
    pub(crate) worker: usize,
    pub(crate) epoch: u64,
    pub(crate) frame: Bytes,
}

/// Broker-side view of one worker: its job channel, the epoch it was
/// spawned under, and the task itself so a stuck worker can be aborted.
pub(crate) struct WorkerHandle {
    pub(crate) epoch: u64,
    pub(crate) job_tx: mpsc::Sender<Bytes>,
    pub(crate) task: JoinHandle<()>,
}

pub(crate) fn spawn_pool(
    size: usize,
    strategy: Arc<dyn EmbeddingStrategy>,
    reply_tx: mpsc::Sender<WorkerReply>,
) -> Vec<WorkerHandle> {
    (0..size)
        .map(|slot| spawn(slot, 0, strategy.clone(), reply_tx.clone()))
        .collect()
}

pub(crate) fn spawn(
    slot: usize,
    epoch: u64,
    strategy: Arc<dyn EmbeddingStrategy>,
    reply_tx: mpsc::Sender<WorkerReply>,
) -> WorkerHandle {
    // Capacity 1: a worker holds at most one queued job; the broker only
    // dispatches to free slots anyway.
    let (job_tx, job_rx) = mpsc::channel(1);
    let task = tokio::spawn(run(slot, epoch, strategy, job_rx, reply_tx));
    WorkerHandle {
        epoch,
        job_tx,
        task,
    }
}

/// Worker loop: one job at a time, every job answered, no failure escapes.
///
/// Closing the job channel is the shutdown instruction: the job in hand is
/// finished and its reply sent before the loop exits.
async fn run(
    slot: usize,
    epoch: u64,
    strategy: Arc<dyn EmbeddingStrategy>,
    mut jobs: mpsc::Receiver<Bytes>,
    replies: mpsc::Sender<WorkerReply>,
) {
    debug!(worker = slot, epoch, "worker started");
    while let Some(frame) = jobs.recv().await {
        let response = match EmbedRequest::from_frame(&frame) {
            Ok(request) => {
                let outcome = strategy
                    .embed(request.payload())
                    .await
                    .map_err(|e| e.to_string());
                EmbedResponse::from_result(request.id(), outcome)
            }
            Err(err) => {
                warn!(worker = slot, error = %err, "received malformed job frame");
                EmbedResponse::from_result(Uuid::nil(), Err("malformed job frame".to_string()))
            }
        };

        // The slot is freed by the reply arriving, so one must always go
        // out; an unencodable response degrades to an empty frame that the
        // broker logs and drops.
        let frame = match response.to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                error!(worker = slot, error = %err, "failed to encode response");
                Bytes::new()
            }
        };
        let reply = WorkerReply {
            worker: slot,
            epoch,
            frame,
        };
        if replies.send(reply).await.is_err() {
            break;
        }
    }
    debug!(worker = slot, "worker exiting");
}
