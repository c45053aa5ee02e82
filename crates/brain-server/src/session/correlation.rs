use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use brain_core::frames::ToolCallResponse;
use brain_core::ids::RequestId;

/// One outstanding tool call: the request id and the slot its response
/// will be delivered into.
#[derive(Debug)]
pub struct PendingCall {
    pub request_id: RequestId,
    pub(crate) slot: oneshot::Receiver<ToolCallResponse>,
}

/// Maps request ids to the slots of calls still waiting for a response.
///
/// Each id is inserted at most once and removed at most once, by either
/// [`resolve`](Self::resolve) or [`expire`](Self::expire). The lock is held
/// only for the map operation itself.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<ToolCallResponse>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call. Returns `None` if the id is already pending.
    pub fn register(&self, request_id: RequestId) -> Option<PendingCall> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&request_id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(request_id.clone(), tx);
        Some(PendingCall {
            request_id,
            slot: rx,
        })
    }

    /// Deliver a response to its pending call and remove the entry. Returns
    /// false when the id is unknown or already resolved, or the waiter is gone.
    pub fn resolve(&self, response: ToolCallResponse) -> bool {
        let slot = self.pending.lock().remove(&response.request_id);
        match slot {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Remove a pending call without delivering anything. Returns false if
    /// it was already removed.
    pub fn expire(&self, request_id: &RequestId) -> bool {
        self.pending.lock().remove(request_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
