//! Queue consumer implementation.
//!
//! Wraps a queue session as a lazy stream of index actions and remembers the
//! acknowledgment handle of every action it yields, in pull order.

use std::collections::VecDeque;
use std::time::Duration;

use log_sink_shared::IndexAction;
use tracing::{debug, error};

use super::broker::QueueSession;
use super::messages::AckHandle;
use crate::errors::IngestError;

/// A yielded action that has not been acknowledged yet.
#[derive(Debug)]
pub struct PendingEntry {
    /// Token that acknowledges the queue entry.
    pub handle: AckHandle,
    /// Id of the action decoded from the entry.
    pub document_id: String,
}

/// FIFO of acknowledgment handles, oldest first.
///
/// Belongs to exactly one consumer. Every handle is either acknowledged or
/// dropped exactly once; a dropped handle leaves its entry for redelivery.
#[derive(Debug, Default)]
pub struct PendingAckList {
    entries: VecDeque<PendingEntry>,
}

impl PendingAckList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the handle of a newly yielded action.
    pub fn push_back(&mut self, entry: PendingEntry) {
        self.entries.push_back(entry);
    }

    /// The oldest outstanding entry, if any.
    pub fn front(&self) -> Option<&PendingEntry> {
        self.entries.front()
    }

    /// Remove and return the oldest outstanding entry.
    pub fn pop_front(&mut self) -> Option<PendingEntry> {
        self.entries.pop_front()
    }

    /// Drop every outstanding handle without acknowledging it.
    ///
    /// Returns the number of handles dropped.
    pub fn abandon(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Consumer that yields decoded index actions from one queue session.
///
/// Nothing is read from the broker until `pull` is called.
pub struct QueueConsumer {
    session: Box<dyn QueueSession>,
    pending: PendingAckList,
    pull_timeout: Duration,
}

impl QueueConsumer {
    /// Create a consumer over an open session.
    ///
    /// # Arguments
    ///
    /// * `session` - The worker's session
    /// * `pull_timeout` - How long one `pull` waits for an entry
    pub fn new(session: Box<dyn QueueSession>, pull_timeout: Duration) -> Self {
        Self {
            session,
            pending: PendingAckList::new(),
            pull_timeout,
        }
    }

    /// Pull the next index action.
    ///
    /// Before an action is returned, its handle is appended to the pending list.
    /// Entries that cannot be decoded are logged and acknowledged so they never
    /// block the queue.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(IndexAction))` - The next action
    /// * `Ok(None)` - Nothing arrived within the pull timeout
    /// * `Err(IngestError)` - The session failed
    pub async fn pull(&mut self) -> Result<Option<IndexAction>, IngestError> {
        loop {
            let Some(entry) = self.session.pull(self.pull_timeout).await? else {
                return Ok(None);
            };

            match IndexAction::from_json_slice(&entry.payload) {
                Ok(action) => {
                    debug!(
                        entry_id = entry.handle.entry_id(),
                        document_id = %action.document_id,
                        "Pulled index action"
                    );
                    self.pending.push_back(PendingEntry {
                        handle: entry.handle,
                        document_id: action.document_id.clone(),
                    });
                    return Ok(Some(action));
                }
                Err(e) => {
                    error!(
                        entry_id = entry.handle.entry_id(),
                        error = %e,
                        payload_len = entry.payload.len(),
                        "Discarding undecodable queue entry"
                    );
                    self.session.ack(entry.handle).await?;
                }
            }
        }
    }

    /// Acknowledge one entry.
    pub async fn acknowledge(&mut self, handle: AckHandle) -> Result<(), IngestError> {
        self.session.ack(handle).await
    }

    /// The handles of yielded, unacknowledged actions.
    pub fn pending(&self) -> &PendingAckList {
        &self.pending
    }

    /// Mutable access to the pending list, for reconciling a flushed chunk.
    pub fn pending_mut(&mut self) -> &mut PendingAckList {
        &mut self.pending
    }

    /// Drop all outstanding handles and ask the session to redeliver them.
    ///
    /// Returns the number of handles dropped.
    pub fn abandon_pending(&mut self) -> usize {
        let count = self.pending.abandon();
        self.session.request_redelivery();
        count
    }

    /// Ask the session to redeliver entries that were dropped unacknowledged.
    pub fn request_redelivery(&mut self) {
        self.session.request_redelivery();
    }
}
