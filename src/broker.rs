use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::embeddings::EmbeddingStrategy;
use crate::errors::EmbedError;
use crate::handle::EmbedHandle;
use crate::pending::PendingTable;
use crate::request::EmbedRequest;
use crate::response::EmbedResponse;
use crate::shutdown::Lifecycle;
use crate::worker::{self, WorkerHandle, WorkerReply};

struct Dispatch {
    request: EmbedRequest,
    timeout: Duration,
}

/// Rendezvous point between concurrent callers and the worker pool.
///
/// `submit` registers the request in the pending table and forwards it to
/// the core loop, which assigns it round-robin to the next free worker and
/// routes the tagged response back to the originating handle.
#[derive(Clone)]
pub struct Broker {
    submit_tx: mpsc::Sender<Dispatch>,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
}

impl Broker {
    pub(crate) fn start(
        config: &BrokerConfig,
        strategy: Arc<dyn EmbeddingStrategy>,
        pending: PendingTable,
        closed: Arc<AtomicBool>,
        lifecycle: watch::Receiver<Lifecycle>,
    ) -> (Self, JoinHandle<()>) {
        let pool_size = config.pool_size.max(1);
        let (submit_tx, submit_rx) = mpsc::channel(config.max_pending.max(1));
        let (reply_tx, reply_rx) = mpsc::channel(pool_size);

        let slots = worker::spawn_pool(pool_size, strategy.clone(), reply_tx.clone());
        let free = (0..pool_size).collect();
        let core = BrokerCore {
            pending: pending.clone(),
            strategy,
            reply_tx,
            slots,
            free,
            in_flight: HashMap::new(),
            next_epoch: 1,
        };
        let task = tokio::spawn(core.run(submit_rx, reply_rx, lifecycle));

        (
            Self {
                submit_tx,
                pending,
                closed,
            },
            task,
        )
    }

    /// Registers and forwards one request; the returned handle is awaitable
    /// and cancellable. Backpressures when the pending queue is at its
    /// bound. Fails with `BrokerClosed` once drain has begun.
    pub async fn submit(
        &self,
        text: impl Into<String>,
        timeout: Duration,
    ) -> Result<EmbedHandle, EmbedError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EmbedError::BrokerClosed);
        }

        let request = EmbedRequest::new(text);
        let id = request.id();
        let rx = self.pending.register(id);

        if self.submit_tx.send(Dispatch { request, timeout }).await.is_err() {
            self.pending.cancel(id);
            return Err(EmbedError::BrokerClosed);
        }
        Ok(EmbedHandle::new(id, rx, self.pending.clone()))
    }
}

/// One dispatched request: which caller it belongs to and when it expires.
struct Job {
    id: Uuid,
    deadline: Instant,
}

/// Single event loop owning all worker-slot state: dispatch, routing, and
/// per-request deadlines never race each other.
struct BrokerCore {
    pending: PendingTable,
    /// Kept so a replacement worker can be spawned into a vacated slot.
    strategy: Arc<dyn EmbeddingStrategy>,
    reply_tx: mpsc::Sender<WorkerReply>,
    slots: Vec<WorkerHandle>,
    /// Free slots in round-robin order: assign from the front, release to
    /// the back.
    free: VecDeque<usize>,
    /// At most one job per busy slot.
    in_flight: HashMap<usize, Job>,
    next_epoch: u64,
}

impl BrokerCore {
    async fn run(
        mut self,
        mut submits: mpsc::Receiver<Dispatch>,
        mut replies: mpsc::Receiver<WorkerReply>,
        mut lifecycle: watch::Receiver<Lifecycle>,
    ) {
        info!(workers = self.slots.len(), "broker loop started");
        loop {
            let next_deadline = self.in_flight.values().map(|job| job.deadline).min();
            let wake = next_deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

            tokio::select! {
                // Requests are pulled only while a worker is free, so queue
                // order is preserved and no worker sees a second job before
                // finishing its first.
                maybe = submits.recv(), if !self.free.is_empty() => {
                    match maybe {
                        Some(dispatch) => self.assign(dispatch).await,
                        None => break,
                    }
                }
                maybe = replies.recv() => {
                    // The core holds a reply sender for respawns, so the
                    // channel outlives the loop.
                    match maybe {
                        Some(reply) => self.route(reply),
                        None => break,
                    }
                }
                _ = sleep_until(wake), if next_deadline.is_some() => {
                    self.expire(Instant::now());
                }
                changed = lifecycle.changed() => {
                    match changed {
                        Ok(()) if *lifecycle.borrow() == Lifecycle::Stopped => break,
                        Ok(()) => {} // Draining: keep servicing accepted work
                        Err(_) => break,
                    }
                }
            }
        }

        self.teardown(submits);
    }

    async fn assign(&mut self, dispatch: Dispatch) {
        let Dispatch { request, timeout } = dispatch;
        let id = request.id();

        if !self.pending.contains(id) {
            debug!(%id, "request cancelled before dispatch, dropping");
            return;
        }

        let frame = match request.to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%id, error = %err, "failed to encode job frame");
                self.pending.complete(
                    id,
                    Err(EmbedError::WorkerFailure("failed to encode request".to_string())),
                );
                return;
            }
        };

        // The select arm only fires while a slot is free.
        let Some(worker) = self.free.pop_front() else {
            self.pending.complete(
                id,
                Err(EmbedError::WorkerFailure("worker pool unavailable".to_string())),
            );
            return;
        };

        // A free slot's channel has capacity, so a send only fails when the
        // worker task itself has died; a fresh worker takes its place.
        if self.slots[worker].job_tx.send(frame.clone()).await.is_err() {
            warn!(worker, "worker task is gone, replacing it");
            self.replace(worker);
            if self.slots[worker].job_tx.send(frame).await.is_err() {
                self.free.push_back(worker);
                self.pending.complete(
                    id,
                    Err(EmbedError::WorkerFailure("worker pool unavailable".to_string())),
                );
                return;
            }
        }

        self.in_flight.insert(
            worker,
            Job {
                id,
                deadline: Instant::now() + timeout,
            },
        );
        debug!(%id, worker, "request dispatched");
    }

    fn route(&mut self, reply: WorkerReply) {
        let WorkerReply {
            worker,
            epoch,
            frame,
        } = reply;

        // A replaced worker's late reply frees nothing: its slot went back
        // to the pool at replacement and its request was already resolved.
        if self.slots.get(worker).map(|slot| slot.epoch) != Some(epoch) {
            debug!(worker, epoch, "reply from a replaced worker dropped");
            return;
        }

        // One reply per job: the slot returns to the pool whatever the
        // frame holds.
        self.free.push_back(worker);
        let job = self.in_flight.remove(&worker);

        let response = match EmbedResponse::from_frame(&frame) {
            Ok(response) => response,
            Err(err) => {
                warn!(worker, error = %err, "malformed response frame dropped");
                if let Some(job) = job {
                    self.pending.complete(
                        job.id,
                        Err(EmbedError::WorkerFailure("malformed response frame".to_string())),
                    );
                }
                return;
            }
        };

        let id = response.request_id();
        if !self.pending.complete(id, response.into_result()) {
            // Already cancelled, timed out, or a duplicate. Never an error
            // to the worker.
            debug!(%id, worker, "stale response dropped");
        }
    }

    fn expire(&mut self, now: Instant) {
        let expired: Vec<usize> = self
            .in_flight
            .iter()
            .filter(|(_, job)| job.deadline <= now)
            .map(|(worker, _)| *worker)
            .collect();

        for worker in expired {
            let Some(job) = self.in_flight.remove(&worker) else {
                continue;
            };
            if self.pending.complete(job.id, Err(EmbedError::Timeout)) {
                warn!(id = %job.id, worker, "request timed out, replacing its worker");
            }
            // The stuck task is aborted and a fresh worker takes the slot,
            // so the pool never shrinks.
            self.replace(worker);
            self.free.push_back(worker);
        }
    }

    fn replace(&mut self, worker: usize) {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let old = std::mem::replace(
            &mut self.slots[worker],
            worker::spawn(worker, epoch, self.strategy.clone(), self.reply_tx.clone()),
        );
        old.task.abort();
    }

    /// Fails whatever the loop still tracks. After a coordinated shutdown
    /// the pending table is already empty and this is a set of no-ops.
    fn teardown(mut self, mut submits: mpsc::Receiver<Dispatch>) {
        submits.close();
        while let Ok(dispatch) = submits.try_recv() {
            self.pending.complete(
                dispatch.request.id(),
                Err(EmbedError::WorkerFailure("broker stopped".to_string())),
            );
        }
        for (_, job) in self.in_flight.drain() {
            self.pending
                .complete(job.id, Err(EmbedError::WorkerFailure("broker stopped".to_string())));
        }
        // Dropping the slots closes every job channel; workers finish the
        // job in hand and exit.
        self.slots.clear();
        info!("broker loop stopped");
    }
}
