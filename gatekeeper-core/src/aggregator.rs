//! Collects findings across every file of one pull request, merges them into
//! reviewable comments and computes the label delta against the current
//! label set.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::labels::{LabelDelta, Requirement};
use crate::visitor::{Finding, ParseFailure};

/// Which side of the diff a comment is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Left,
    Right,
}

/// One review comment bound to a file path and line.
///
/// Comments are always placed on the right-hand (new-version) side: only
/// added or changed lines are guaranteed to be commentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewComment {
    pub path: String,
    pub line: usize,
    pub side: Side,
    pub body: String,
}

/// Everything one evaluation hands back to the API layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub comments: Vec<ReviewComment>,
    pub labels: LabelDelta,
}

impl ReviewOutcome {
    pub fn is_clean(&self) -> bool {
        self.comments.is_empty() && self.labels.is_empty()
    }

    /// Single aggregated report for when individual line comments cannot be
    /// placed (e.g. findings on unchanged lines).
    pub fn summary(&self) -> String {
        let mut report = String::from("The following issues need to be addressed:\n");
        let mut current_file: Option<&str> = None;
        for comment in &self.comments {
            if current_file != Some(comment.path.as_str()) {
                report.push_str(&format!("\n### `{}`\n\n", comment.path));
                current_file = Some(comment.path.as_str());
            }
            for message in comment.body.lines() {
                report.push_str(&format!("- Line {}: {}\n", comment.line, message));
            }
        }
        report
    }
}

/// Accumulates findings for one pull-request evaluation.
///
/// Create one per evaluation and discard it afterwards; [`finalize`] consumes
/// the aggregator so it cannot be reused or finalized twice.
///
/// [`finalize`]: ReviewAggregator::finalize
#[derive(Debug, Default)]
pub struct ReviewAggregator {
    /// Keyed by (path, line) so repeated findings on one line merge into a
    /// single comment.
    comments: BTreeMap<(String, usize), String>,
    /// Requirement kinds observed anywhere in the pull request.
    observed: HashSet<Requirement>,
}

impl ReviewAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finding, merging it into an existing comment when another
    /// finding already targets the same file and line.
    pub fn record(&mut self, finding: Finding) {
        self.observed.insert(finding.requirement);
        let message = finding.message();
        self.comments
            .entry((finding.file, finding.line))
            .and_modify(|body| {
                body.push('\n');
                body.push_str(&message);
            })
            .or_insert(message);
    }

    /// Record a parse failure for one file.
    ///
    /// Surfaces as a review comment like any other finding, but is excluded
    /// from label computation.
    pub fn record_parse_failure(&mut self, file: &str, failure: &ParseFailure) {
        let message = format!("This file could not be parsed: {}.", failure.detail);
        self.comments
            .entry((file.to_string(), failure.line))
            .and_modify(|body| {
                body.push('\n');
                body.push_str(&message);
            })
            .or_insert(message);
    }

    /// Finalize the evaluation: build the comment list and the minimal label
    /// delta against `current_labels`.
    ///
    /// Call once, after every file in the pull request has been visited.
    pub fn finalize(self, current_labels: &[String]) -> ReviewOutcome {
        let mut labels = LabelDelta::default();
        for (label, observed) in self.family_observations() {
            let present = current_labels.iter().any(|l| l == label);
            if observed && !present {
                labels.add.push(label.to_string());
            } else if !observed && present {
                labels.remove.push(label.to_string());
            }
        }

        let comments = self
            .comments
            .into_iter()
            .map(|((path, line), body)| ReviewComment {
                path,
                line,
                side: Side::Right,
                body,
            })
            .collect();

        ReviewOutcome { comments, labels }
    }

    /// The three label-worthy requirement families and whether each was seen.
    fn family_observations(&self) -> [(&'static str, bool); 3] {
        let hints = self.observed.contains(&Requirement::MissingTypeHint)
            || self.observed.contains(&Requirement::MissingReturnTypeHint);
        [
            (
                Requirement::MissingDoctest.label(),
                self.observed.contains(&Requirement::MissingDoctest),
            ),
            (Requirement::MissingTypeHint.label(), hints),
            (
                Requirement::MissingDescriptiveName.label(),
                self.observed.contains(&Requirement::MissingDescriptiveName),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{REQUIRE_DESCRIPTIVE_NAMES, REQUIRE_DOCTESTS, REQUIRE_TYPE_HINTS};
    use crate::visitor::SubjectKind;

    fn finding(file: &str, line: usize, name: &str, requirement: Requirement) -> Finding {
        Finding {
            file: file.to_string(),
            line,
            subject_name: name.to_string(),
            subject_kind: SubjectKind::Parameter,
            requirement,
        }
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_same_line_findings_merge_into_one_comment() {
        let mut aggregator = ReviewAggregator::new();
        aggregator.record(finding("a.py", 3, "n", Requirement::MissingDescriptiveName));
        aggregator.record(finding("a.py", 3, "n", Requirement::MissingTypeHint));
        aggregator.record(finding("a.py", 7, "m", Requirement::MissingTypeHint));

        let outcome = aggregator.finalize(&[]);
        assert_eq!(outcome.comments.len(), 2);
        let merged = &outcome.comments[0];
        assert_eq!((merged.path.as_str(), merged.line), ("a.py", 3));
        assert_eq!(merged.body.lines().count(), 2);
        assert_eq!(merged.side, Side::Right);
    }

    #[test]
    fn test_comment_membership_is_order_independent() {
        let first = finding("a.py", 3, "n", Requirement::MissingDescriptiveName);
        let second = finding("a.py", 3, "n", Requirement::MissingTypeHint);

        let mut forward = ReviewAggregator::new();
        forward.record(first.clone());
        forward.record(second.clone());
        let mut backward = ReviewAggregator::new();
        backward.record(second);
        backward.record(first);

        let forward = forward.finalize(&[]);
        let backward = backward.finalize(&[]);
        assert_eq!(forward.comments.len(), backward.comments.len());
        assert_eq!(forward.labels, backward.labels);
        // Only body ordering within the merged comment may differ.
        let mut forward_lines: Vec<_> = forward.comments[0].body.lines().collect();
        let mut backward_lines: Vec<_> = backward.comments[0].body.lines().collect();
        forward_lines.sort_unstable();
        backward_lines.sort_unstable();
        assert_eq!(forward_lines, backward_lines);
    }

    #[test]
    fn test_label_added_when_observed_and_absent() {
        let mut aggregator = ReviewAggregator::new();
        aggregator.record(finding("a.py", 1, "n", Requirement::MissingTypeHint));
        let outcome = aggregator.finalize(&[]);
        assert_eq!(outcome.labels.add, vec![REQUIRE_TYPE_HINTS.to_string()]);
        assert!(outcome.labels.remove.is_empty());
    }

    #[test]
    fn test_label_removed_when_requirement_satisfied() {
        let aggregator = ReviewAggregator::new();
        let current = labels(&[REQUIRE_DOCTESTS, REQUIRE_TYPE_HINTS]);
        let outcome = aggregator.finalize(&current);
        assert!(outcome.labels.add.is_empty());
        assert_eq!(
            outcome.labels.remove,
            vec![REQUIRE_DOCTESTS.to_string(), REQUIRE_TYPE_HINTS.to_string()]
        );
    }

    #[test]
    fn test_present_label_not_readded() {
        let mut aggregator = ReviewAggregator::new();
        aggregator.record(finding("a.py", 1, "n", Requirement::MissingReturnTypeHint));
        let outcome = aggregator.finalize(&labels(&[REQUIRE_TYPE_HINTS]));
        assert!(outcome.labels.is_empty());
    }

    #[test]
    fn test_delta_never_adds_and_removes_same_label() {
        let mut aggregator = ReviewAggregator::new();
        aggregator.record(finding("a.py", 1, "x", Requirement::MissingDescriptiveName));
        let outcome = aggregator.finalize(&labels(&[REQUIRE_DOCTESTS]));
        assert_eq!(
            outcome.labels.add,
            vec![REQUIRE_DESCRIPTIVE_NAMES.to_string()]
        );
        assert_eq!(outcome.labels.remove, vec![REQUIRE_DOCTESTS.to_string()]);
        for added in &outcome.labels.add {
            assert!(!outcome.labels.remove.contains(added));
        }
    }

    #[test]
    fn test_parse_failure_comments_but_does_not_label() {
        let mut aggregator = ReviewAggregator::new();
        aggregator.record_parse_failure(
            "broken.py",
            &ParseFailure {
                line: 4,
                detail: "invalid syntax near `def broken(:`".to_string(),
            },
        );
        let outcome = aggregator.finalize(&[]);
        assert_eq!(outcome.comments.len(), 1);
        assert_eq!(outcome.comments[0].line, 4);
        assert!(outcome.comments[0].body.contains("could not be parsed"));
        assert!(outcome.labels.is_empty());
    }

    #[test]
    fn test_empty_evaluation_is_clean() {
        let outcome = ReviewAggregator::new().finalize(&[]);
        assert!(outcome.is_clean());
    }

    #[test]
    fn test_summary_groups_by_file() {
        let mut aggregator = ReviewAggregator::new();
        aggregator.record(finding("b.py", 2, "n", Requirement::MissingTypeHint));
        aggregator.record(finding("a.py", 9, "m", Requirement::MissingTypeHint));
        aggregator.record(finding("a.py", 9, "m", Requirement::MissingDescriptiveName));
        let summary = aggregator.finalize(&[]).summary();
        assert!(summary.contains("### `a.py`"));
        assert!(summary.contains("### `b.py`"));
        assert_eq!(summary.matches("- Line 9:").count(), 2);
    }
}
