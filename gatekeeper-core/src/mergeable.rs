//! Retry policy for the asynchronously computed mergeability property.
//!
//! The remote system computes whether a pull request is mergeable in the
//! background, so a single query may come back unresolved. The policy here is
//! pure (attempt number in, optional delay out); the surrounding scheduler
//! owns the actual waiting.

use std::time::Duration;

use crate::labels::{toggle_delta, LabelDelta, MERGE_CONFLICT};

/// Maximum number of mergeability queries per triggering event.
pub const MAX_ATTEMPTS: u32 = 5;

/// Delay to wait before issuing query number `attempt` (zero-indexed), or
/// `None` once the retry budget is exhausted.
///
/// The first attempt is immediate; each later attempt waits one more time
/// unit than the previous.
pub fn backoff(attempt: u32) -> Option<Duration> {
    (attempt < MAX_ATTEMPTS).then(|| Duration::from_secs(u64::from(attempt)))
}

/// Reconcile the merge-conflict label once mergeability has resolved.
///
/// Add when unmergeable and absent, remove when mergeable and present,
/// otherwise no-op. Exhausted polls never reach this point: they terminate
/// silently and the next triggering event retries from scratch.
pub fn merge_conflict_delta(mergeable: bool, current_labels: &[String]) -> LabelDelta {
    toggle_delta(MERGE_CONFLICT, !mergeable, current_labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_waits_are_strictly_increasing_from_zero() {
        let waits: Vec<u64> = (0..MAX_ATTEMPTS)
            .map(|attempt| backoff(attempt).unwrap().as_secs())
            .collect();
        assert_eq!(waits, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_backoff_exhausts_after_max_attempts() {
        assert_eq!(backoff(MAX_ATTEMPTS), None);
        assert_eq!(backoff(MAX_ATTEMPTS + 1), None);
    }

    #[test]
    fn test_unresolved_poll_issues_exactly_five_queries() {
        // Simulate the scheduler loop against a never-resolving value.
        let mut queries = 0;
        let mut attempt = 0;
        while let Some(_delay) = backoff(attempt) {
            queries += 1;
            attempt += 1;
        }
        assert_eq!(queries, 5);
    }

    #[test]
    fn test_conflict_label_added_when_unmergeable() {
        let delta = merge_conflict_delta(false, &[]);
        assert_eq!(delta.add, vec![MERGE_CONFLICT.to_string()]);
    }

    #[test]
    fn test_conflict_label_removed_when_mergeable_again() {
        let delta = merge_conflict_delta(true, &[MERGE_CONFLICT.to_string()]);
        assert_eq!(delta.remove, vec![MERGE_CONFLICT.to_string()]);
    }

    #[test]
    fn test_conflict_label_reconciliation_is_idempotent() {
        assert!(merge_conflict_delta(true, &[]).is_empty());
        assert!(merge_conflict_delta(false, &[MERGE_CONFLICT.to_string()]).is_empty());
    }
}
