//! Request and response types for bulk-write operations.

/// Result of a bulk-write for a single action.
///
/// This struct represents the outcome reported by the backend for one action of a
/// bulk request. It indicates whether the write succeeded and includes error
/// details if it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    /// The document id echoed by the backend, if it reported one.
    pub document_id: Option<String>,
    /// HTTP-style status code reported for this action.
    pub status: u16,
    /// Whether the write succeeded.
    pub success: bool,
    /// Error detail if the write failed.
    pub error: Option<String>,
}

impl BulkItemResult {
    /// A successful result for the given document id.
    pub fn ok(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            status: 201,
            success: true,
            error: None,
        }
    }

    /// A failed result for the given document id.
    pub fn failed(document_id: impl Into<String>, status: u16, error: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            status,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Summary of a bulk-write containing aggregate statistics and individual results.
///
/// This struct provides a complete overview of a bulk request, including the
/// number of actions submitted, how many succeeded and failed, and the ordered
/// results for each individual action. This allows callers to handle partial
/// failures gracefully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteSummary {
    /// Number of actions submitted.
    pub total: usize,
    /// Number of successful writes.
    pub succeeded: usize,
    /// Number of failed writes.
    pub failed: usize,
    /// Individual results, in submission order.
    pub results: Vec<BulkItemResult>,
}

impl BulkWriteSummary {
    /// Build a summary from the ordered results of a request of `total` actions.
    pub fn from_results(total: usize, results: Vec<BulkItemResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total,
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Whether the backend returned exactly one result per submitted action.
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.total
    }
}
