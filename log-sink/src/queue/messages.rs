//! Message types for the queue.

/// Broker-issued token that acknowledges exactly one delivered entry.
///
/// Handles are not `Clone`: acknowledging consumes the handle, so an entry can
/// be acknowledged at most once by the session that received it.
#[derive(Debug, PartialEq, Eq)]
pub struct AckHandle {
    entry_id: String,
}

impl AckHandle {
    /// Wrap a broker entry id.
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
        }
    }

    /// The broker entry id this handle acknowledges.
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }
}

/// A raw entry delivered by a queue session, not yet decoded.
#[derive(Debug)]
pub struct QueueEntry {
    /// Token used to acknowledge this delivery.
    pub handle: AckHandle,
    /// The serialized index action.
    pub payload: Vec<u8>,
}

impl QueueEntry {
    /// Create a new entry.
    pub fn new(handle: AckHandle, payload: Vec<u8>) -> Self {
        Self { handle, payload }
    }
}
