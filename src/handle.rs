use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::errors::EmbedError;
use crate::pending::{Completion, PendingTable};

/// Caller-visible side of one outstanding embedding request.
///
/// Exactly one of {completion, cancellation} happens per handle; both are
/// terminal.
pub struct EmbedHandle {
    id: Uuid,
    rx: oneshot::Receiver<Completion>,
    pending: PendingTable,
}

impl EmbedHandle {
    pub(crate) fn new(id: Uuid, rx: oneshot::Receiver<Completion>, pending: PendingTable) -> Self {
        Self { id, rx, pending }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for the terminal outcome of this request.
    ///
    /// Resolves with `Cancelled` when the request was cancelled by the
    /// caller or by shutdown before a response was routed to it.
    pub async fn result(&mut self) -> Result<Vec<f32>, EmbedError> {
        match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EmbedError::Cancelled),
        }
    }

    /// Cancels the request if it has not completed yet. Idempotent:
    /// cancelling a settled or already-cancelled handle is a no-op.
    pub fn cancel(&self) {
        if self.pending.cancel(self.id) {
            debug!(id = %self.id, "request cancelled before completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_handle_resolves_with_cancelled() {
        let pending = PendingTable::new();
        let id = Uuid::new_v4();
        let rx = pending.register(id);
        let mut handle = EmbedHandle::new(id, rx, pending.clone());

        handle.cancel();
        handle.cancel(); // no-op

        assert_eq!(handle.result().await, Err(EmbedError::Cancelled));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn delivered_outcome_reaches_the_handle() {
        let pending = PendingTable::new();
        let id = Uuid::new_v4();
        let rx = pending.register(id);
        let mut handle = EmbedHandle::new(id, rx, pending.clone());

        assert!(pending.complete(id, Ok(vec![7.0])));
        assert_eq!(handle.result().await, Ok(vec![7.0]));

        // Cancel after completion is a no-op.
        handle.cancel();
    }
}
