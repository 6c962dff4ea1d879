use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::errors::EmbedError;

pub(crate) type Completion = Result<Vec<f32>, EmbedError>;

/// Correlation table mapping a request id to the waiter for its outcome.
///
/// An entry exists from dispatch registration until the response is
/// delivered, the caller cancels, or shutdown force-cancels. All three paths
/// remove under the same lock, so the first to remove wins and the losers
/// become no-ops: every request resolves exactly once.
#[derive(Clone, Default)]
pub(crate) struct PendingTable {
    inner: Arc<Mutex<HashMap<Uuid, oneshot::Sender<Completion>>>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `id`. At most one entry per id may exist.
    pub(crate) fn register(&self, id: Uuid) -> oneshot::Receiver<Completion> {
        let (tx, rx) = oneshot::channel();
        let previous = self.inner.lock().unwrap().insert(id, tx);
        debug_assert!(previous.is_none(), "duplicate pending entry for {id}");
        rx
    }

    /// Delivers the outcome to the waiter, if one is still registered.
    /// Returns false when the entry was already removed.
    pub(crate) fn complete(&self, id: Uuid, outcome: Completion) -> bool {
        match self.inner.lock().unwrap().remove(&id) {
            Some(tx) => {
                // The waiter may have dropped its handle; the entry is
                // consumed either way.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Removes the entry and drops its sender, which unblocks the waiter
    /// with `Cancelled`. Returns false when the entry was already removed.
    pub(crate) fn cancel(&self, id: Uuid) -> bool {
        self.inner.lock().unwrap().remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: Uuid) -> bool {
        self.inner.lock().unwrap().contains_key(&id)
    }

    pub(crate) fn snapshot(&self) -> Vec<Uuid> {
        self.inner.lock().unwrap().keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
