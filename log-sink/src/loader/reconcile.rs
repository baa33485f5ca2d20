//! Pairing bulk results with pending acknowledgment handles.

use log_sink_repository::BulkWriteSummary;

use crate::queue::{AckHandle, PendingAckList};

/// A chunk entry that the backend rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEntry {
    pub document_id: String,
    pub status: u16,
    pub error: Option<String>,
}

/// What to do with each pending handle after a bulk response.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Handles to acknowledge, oldest first.
    pub acknowledge: Vec<AckHandle>,
    /// Entries the backend rejected. Their handles are dropped.
    pub rejected: Vec<RejectedEntry>,
    /// Entries whose outcome could not be attributed. Their handles are dropped.
    pub unattributed: usize,
    /// Position of the first result that did not line up with the pending list.
    pub diverged_at: Option<usize>,
}

impl ReconcilePlan {
    /// Whether any entry was left unacknowledged.
    pub fn needs_redelivery(&self) -> bool {
        !self.rejected.is_empty() || self.unattributed > 0
    }
}

/// Walk the results in order and pop one pending handle per result.
///
/// A result lines up with the oldest pending entry when it echoes the same
/// document id. A result without an id lines up only when the response carries
/// exactly one result per pending entry. Reconciliation stops at the first
/// result that does not line up; every handle from there on is dropped so the
/// entries are redelivered. The pending list is empty afterwards.
pub fn reconcile(pending: &mut PendingAckList, summary: &BulkWriteSummary) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let lengths_match = summary.results.len() == pending.len();

    for (position, result) in summary.results.iter().enumerate() {
        let Some(front) = pending.front() else {
            plan.diverged_at = Some(position);
            break;
        };

        let aligned = match &result.document_id {
            Some(id) => *id == front.document_id,
            None => lengths_match,
        };
        if !aligned {
            plan.diverged_at = Some(position);
            break;
        }

        let Some(entry) = pending.pop_front() else {
            break;
        };
        if result.success {
            plan.acknowledge.push(entry.handle);
        } else {
            plan.rejected.push(RejectedEntry {
                document_id: entry.document_id,
                status: result.status,
                error: result.error.clone(),
            });
        }
    }

    if plan.diverged_at.is_none() && !pending.is_empty() {
        plan.diverged_at = Some(summary.results.len());
    }
    plan.unattributed = pending.abandon();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PendingEntry;
    use log_sink_repository::BulkItemResult;

    fn pending(ids: &[&str]) -> PendingAckList {
        let mut list = PendingAckList::new();
        for (n, id) in ids.iter().enumerate() {
            list.push_back(PendingEntry {
                handle: AckHandle::new(format!("{}-0", n + 1)),
                document_id: id.to_string(),
            });
        }
        list
    }

    fn acked(plan: &ReconcilePlan) -> Vec<&str> {
        plan.acknowledge.iter().map(|h| h.entry_id()).collect()
    }

    #[test]
    fn test_all_successful() {
        let mut list = pending(&["a", "b", "c"]);
        let summary = BulkWriteSummary::from_results(
            3,
            vec![
                BulkItemResult::ok("a"),
                BulkItemResult::ok("b"),
                BulkItemResult::ok("c"),
            ],
        );

        let plan = reconcile(&mut list, &summary);

        assert_eq!(acked(&plan), vec!["1-0", "2-0", "3-0"]);
        assert!(!plan.needs_redelivery());
        assert!(list.is_empty());
    }

    #[test]
    fn test_failed_entry_is_skipped_and_later_entries_acknowledged() {
        let mut list = pending(&["a", "b", "c"]);
        let summary = BulkWriteSummary::from_results(
            3,
            vec![
                BulkItemResult::ok("a"),
                BulkItemResult::failed("b", 400, "mapper_parsing_exception"),
                BulkItemResult::ok("c"),
            ],
        );

        let plan = reconcile(&mut list, &summary);

        assert_eq!(acked(&plan), vec!["1-0", "3-0"]);
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].document_id, "b");
        assert_eq!(plan.rejected[0].status, 400);
        assert_eq!(plan.unattributed, 0);
        assert!(plan.needs_redelivery());
        assert!(list.is_empty());
    }

    #[test]
    fn test_id_mismatch_stops_reconciliation() {
        let mut list = pending(&["a", "b", "c"]);
        let summary = BulkWriteSummary::from_results(
            3,
            vec![
                BulkItemResult::ok("a"),
                BulkItemResult::ok("c"),
                BulkItemResult::ok("b"),
            ],
        );

        let plan = reconcile(&mut list, &summary);

        assert_eq!(acked(&plan), vec!["1-0"]);
        assert_eq!(plan.diverged_at, Some(1));
        assert_eq!(plan.unattributed, 2);
        assert!(list.is_empty());
    }

    #[test]
    fn test_short_response_leaves_tail_unattributed() {
        let mut list = pending(&["a", "b", "c"]);
        let summary = BulkWriteSummary::from_results(
            3,
            vec![BulkItemResult::ok("a"), BulkItemResult::ok("b")],
        );

        let plan = reconcile(&mut list, &summary);

        assert_eq!(acked(&plan), vec!["1-0", "2-0"]);
        assert_eq!(plan.diverged_at, Some(2));
        assert_eq!(plan.unattributed, 1);
    }

    #[test]
    fn test_results_without_ids_require_matching_length() {
        let anonymous = BulkItemResult {
            document_id: None,
            status: 201,
            success: true,
            error: None,
        };

        let mut list = pending(&["a", "b"]);
        let summary = BulkWriteSummary::from_results(2, vec![anonymous.clone(), anonymous.clone()]);
        let plan = reconcile(&mut list, &summary);
        assert_eq!(acked(&plan), vec!["1-0", "2-0"]);

        let mut list = pending(&["a", "b"]);
        let summary = BulkWriteSummary::from_results(2, vec![anonymous]);
        let plan = reconcile(&mut list, &summary);
        assert!(plan.acknowledge.is_empty());
        assert_eq!(plan.diverged_at, Some(0));
        assert_eq!(plan.unattributed, 2);
    }

    #[test]
    fn test_extra_results_are_ignored() {
        let mut list = pending(&["a"]);
        let summary = BulkWriteSummary::from_results(
            1,
            vec![BulkItemResult::ok("a"), BulkItemResult::ok("z")],
        );

        let plan = reconcile(&mut list, &summary);

        assert_eq!(acked(&plan), vec!["1-0"]);
        assert_eq!(plan.diverged_at, Some(1));
        assert_eq!(plan.unattributed, 0);
    }
}
