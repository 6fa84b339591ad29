//! Event drivers: each webhook event type maps to one handler that fetches
//! what the core needs, runs the relevant core computation and applies the
//! resulting label delta and comments through the GitHub client.

use anyhow::Result;
use tracing::{info, warn};

use gatekeeper_core::labels::{toggle_delta, FAILED_CHECKS, INVALID};
use gatekeeper_core::{mergeable, stage, ChangedFile, LifecycleEvent, PullRequestReview};

use crate::github::PullRequestRef;
use crate::AppState;

/// Author associations whose reviews drive stage transitions.
const QUALIFYING_ASSOCIATIONS: &[&str] = &["OWNER", "MEMBER", "COLLABORATOR"];

const REVIEW_BODY: &str =
    "Some contribution requirements are not met. Please address the comments below.";

pub fn is_qualifying_reviewer(author_association: &str) -> bool {
    QUALIFYING_ASSOCIATIONS.contains(&author_association)
}

/// Map a submitted review's state to a lifecycle event, if it drives one.
pub fn review_lifecycle_event(review_state: &str) -> Option<LifecycleEvent> {
    match review_state {
        "changes_requested" => Some(LifecycleEvent::ChangesRequested),
        "approved" => Some(LifecycleEvent::Approved),
        _ => None,
    }
}

/// Pull request opened, reopened or marked ready for review.
pub async fn handle_opened(state: &AppState, pr: &PullRequestRef) -> Result<()> {
    let details = state.github_client.get_pull_request(pr).await?;
    let labels = details.label_names();
    let files = state.github_client.list_changed_files(pr).await?;

    let review = PullRequestReview::new(&files);

    // File conventions are enforced before any review work: submissions
    // carrying unacceptable file types are labelled invalid and closed.
    let invalid_files = review.classifier().validate_extensions(&files);
    if !invalid_files.is_empty() {
        info!(
            "PR #{} contains {} invalid files, closing",
            pr.pr_number,
            invalid_files.len()
        );
        let listing = invalid_files
            .iter()
            .map(|name| format!("- `{name}`"))
            .collect::<Vec<_>>()
            .join("\n");
        let body = format!(
            "Closing this pull request because the following files are not of \
             an accepted type:\n\n{listing}\n\nPlease remove them and open a \
             new pull request."
        );
        state.github_client.post_issue_comment(pr, &body).await?;
        state
            .github_client
            .add_labels(pr, &[INVALID.to_string()])
            .await?;
        state.github_client.close_pull_request(pr).await?;
        return Ok(());
    }

    apply_stage(
        state,
        pr,
        LifecycleEvent::Opened {
            draft: details.draft,
        },
        &labels,
    )
    .await?;

    if let Some(label) = review.classifier().content_type_label(&files, &labels) {
        state
            .github_client
            .add_labels(pr, &[label.to_string()])
            .await?;
    }

    run_quality_review(state, pr, review, &files, &labels, &details.head.sha, false).await
}

/// New commits pushed to the head branch.
pub async fn handle_synchronized(state: &AppState, pr: &PullRequestRef) -> Result<()> {
    let details = state.github_client.get_pull_request(pr).await?;
    let labels = details.label_names();
    let files = state.github_client.list_changed_files(pr).await?;

    apply_stage(state, pr, LifecycleEvent::Synchronized, &labels).await?;

    // Only newly added files are re-reviewed on a push; files already
    // reviewed in place keep their existing comments.
    let review = PullRequestReview::new(&files);
    run_quality_review(state, pr, review, &files, &labels, &details.head.sha, true).await
}

/// A review was submitted on the pull request.
pub async fn handle_review_submitted(
    state: &AppState,
    pr: &PullRequestRef,
    review_state: &str,
    author_association: &str,
) -> Result<()> {
    if !is_qualifying_reviewer(author_association) {
        info!(
            "Ignoring review from non-qualifying association {author_association:?} on PR #{}",
            pr.pr_number
        );
        return Ok(());
    }
    let Some(event) = review_lifecycle_event(review_state) else {
        return Ok(());
    };

    let details = state.github_client.get_pull_request(pr).await?;
    apply_stage(state, pr, event, &details.label_names()).await
}

/// Pull request closed (merged or not).
pub async fn handle_closed(state: &AppState, pr: &PullRequestRef) -> Result<()> {
    let details = state.github_client.get_pull_request(pr).await?;
    apply_stage(state, pr, LifecycleEvent::Closed, &details.label_names()).await
}

/// A check suite finished on the head commit.
pub async fn handle_check_suite_completed(
    state: &AppState,
    pr: &PullRequestRef,
    success: bool,
) -> Result<()> {
    let details = state.github_client.get_pull_request(pr).await?;
    let delta = toggle_delta(FAILED_CHECKS, !success, &details.label_names());
    if !delta.is_empty() {
        state.github_client.apply_label_delta(pr, &delta).await?;
    }
    Ok(())
}

/// Poll the eventually-consistent mergeability property and reconcile the
/// merge-conflict label once it resolves.
///
/// Exhausting the retry budget is a recoverable no-op: the next triggering
/// event starts a fresh poll.
pub async fn poll_mergeability(state: &AppState, pr: &PullRequestRef) -> Result<()> {
    let mut attempt = 0;
    while let Some(delay) = mergeable::backoff(attempt) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let details = state.github_client.get_pull_request(pr).await?;
        if let Some(is_mergeable) = details.mergeable {
            let delta = mergeable::merge_conflict_delta(is_mergeable, &details.label_names());
            if !delta.is_empty() {
                state.github_client.apply_label_delta(pr, &delta).await?;
            }
            return Ok(());
        }
        attempt += 1;
    }
    info!(
        "Mergeability of PR #{} still unresolved after {} attempts",
        pr.pr_number,
        mergeable::MAX_ATTEMPTS
    );
    Ok(())
}

async fn apply_stage(
    state: &AppState,
    pr: &PullRequestRef,
    event: LifecycleEvent,
    labels: &[String],
) -> Result<()> {
    let Some(requested) = stage::requested_stage(event, labels) else {
        return Ok(());
    };
    let delta = stage::advance(labels, requested);
    if !delta.is_empty() {
        state.github_client.apply_label_delta(pr, &delta).await?;
    }
    Ok(())
}

/// Run the requirements check over the eligible files, pulling contents one
/// file at a time, then apply the outcome.
async fn run_quality_review(
    state: &AppState,
    pr: &PullRequestRef,
    mut review: PullRequestReview,
    files: &[ChangedFile],
    labels: &[String],
    head_sha: &str,
    ignore_modified: bool,
) -> Result<()> {
    let eligible: Vec<ChangedFile> = review.eligible(files, ignore_modified).cloned().collect();
    for file in &eligible {
        match state
            .github_client
            .get_file_contents(pr, &file.name, head_sha)
            .await
        {
            Ok(text) => review.push_file(&file.name, &text),
            // Binary or inaccessible files are skipped, not fatal.
            Err(e) => warn!("Skipping contents of {}: {e:#}", file.name),
        }
    }

    let outcome = review.finalize(labels);
    if !outcome.labels.is_empty() {
        state
            .github_client
            .apply_label_delta(pr, &outcome.labels)
            .await?;
    }

    if !outcome.comments.is_empty() {
        let submitted = state
            .github_client
            .create_review(pr, REVIEW_BODY, &outcome.comments)
            .await;
        if let Err(e) = submitted {
            // Line comments can be rejected when findings sit on unchanged
            // lines; fall back to one aggregated report.
            warn!("Review submission failed, posting aggregated report: {e:#}");
            state
                .github_client
                .post_issue_comment(pr, &outcome.summary())
                .await?;
        }
    }

    info!(
        "Quality review of PR #{} finished: {} comments, +{} / -{} labels",
        pr.pr_number,
        outcome.comments.len(),
        outcome.labels.add.len(),
        outcome.labels.remove.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifying_reviewer_associations() {
        assert!(is_qualifying_reviewer("OWNER"));
        assert!(is_qualifying_reviewer("MEMBER"));
        assert!(is_qualifying_reviewer("COLLABORATOR"));
        assert!(!is_qualifying_reviewer("NONE"));
        assert!(!is_qualifying_reviewer("FIRST_TIME_CONTRIBUTOR"));
    }

    #[test]
    fn test_review_lifecycle_event_mapping() {
        assert_eq!(
            review_lifecycle_event("changes_requested"),
            Some(LifecycleEvent::ChangesRequested)
        );
        assert_eq!(
            review_lifecycle_event("approved"),
            Some(LifecycleEvent::Approved)
        );
        assert_eq!(review_lifecycle_event("commented"), None);
        assert_eq!(review_lifecycle_event("dismissed"), None);
    }
}
