//! Driver for one pull-request evaluation.
//!
//! Owns the classifier, the aggregator and the pull-request-wide doctest
//! suppression flag. Files are pushed one at a time so that at most one
//! syntax tree is alive per evaluation; every evaluation owns its own state,
//! so concurrent pull requests need no locking discipline.

use crate::aggregator::{ReviewAggregator, ReviewOutcome};
use crate::files::{is_test_file, ChangedFile, FileClassifier};
use crate::visitor::{check_source, contains_test_definitions};

/// One pull-request evaluation. Create fresh per pull request, push the
/// eligible files, then finalize.
#[derive(Debug, Default)]
pub struct PullRequestReview {
    classifier: FileClassifier,
    aggregator: ReviewAggregator,
    /// Any test file anywhere in the pull request suppresses the doctest
    /// requirement everywhere: a single test file may cover several
    /// implementation files.
    pr_has_test_file: bool,
}

impl PullRequestReview {
    pub fn new(files: &[ChangedFile]) -> Self {
        Self {
            classifier: FileClassifier::default(),
            aggregator: ReviewAggregator::new(),
            pr_has_test_file: files.iter().any(|file| is_test_file(&file.name)),
        }
    }

    pub fn with_classifier(files: &[ChangedFile], classifier: FileClassifier) -> Self {
        Self {
            classifier,
            ..Self::new(files)
        }
    }

    /// The files the caller should fetch contents for, in input order.
    pub fn eligible<'a>(
        &'a self,
        files: &'a [ChangedFile],
        ignore_modified: bool,
    ) -> impl Iterator<Item = &'a ChangedFile> + 'a {
        self.classifier
            .eligible_for_requirements_check(files, ignore_modified)
    }

    pub fn classifier(&self) -> &FileClassifier {
        &self.classifier
    }

    /// Visit one file's decoded text and record its findings.
    ///
    /// Unparsable files record a single parse-failure comment and do not
    /// abort the evaluation; the caller continues with the next file.
    pub fn push_file(&mut self, name: &str, source: &str) {
        let skip_doctests =
            self.pr_has_test_file || is_test_file(name) || contains_test_definitions(source);
        match check_source(name, source, skip_doctests) {
            Ok(findings) => {
                for finding in findings {
                    self.aggregator.record(finding);
                }
            }
            Err(failure) => self.aggregator.record_parse_failure(name, &failure),
        }
    }

    /// Finish the evaluation. A caller may finalize after any prefix of the
    /// eligible files (cooperative cancellation), at the cost of an
    /// incomplete label delta.
    pub fn finalize(self, current_labels: &[String]) -> ReviewOutcome {
        self.aggregator.finalize(current_labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileStatus;
    use crate::labels::{Requirement, REQUIRE_DOCTESTS, REQUIRE_TYPE_HINTS};

    fn added(name: &str) -> ChangedFile {
        ChangedFile::new(name, FileStatus::Added)
    }

    #[test]
    fn test_test_file_in_pr_suppresses_doctest_findings_everywhere() {
        let files = vec![added("algo.py"), added("test_algo.py")];
        let mut review = PullRequestReview::new(&files);
        review.push_file("algo.py", "def solve(target: int) -> int:\n    return target\n");
        let outcome = review.finalize(&[]);
        assert!(
            outcome.is_clean(),
            "no doctest findings expected, got {outcome:?}"
        );
    }

    #[test]
    fn test_own_test_definitions_suppress_doctest_findings() {
        let files = vec![added("algo.py")];
        let mut review = PullRequestReview::new(&files);
        let source = "\
def solve(target: int) -> int:
    return target


def test_solve() -> None:
    assert solve(1) == 1
";
        review.push_file("algo.py", source);
        let outcome = review.finalize(&[]);
        assert!(outcome.is_clean(), "got {outcome:?}");
    }

    #[test]
    fn test_findings_accumulate_across_files() {
        let files = vec![added("a.py"), added("b.py"), added("test_a.py")];
        let mut review = PullRequestReview::new(&files);
        review.push_file("a.py", "def solve(target) -> int:\n    return target\n");
        review.push_file("b.py", "def apply(value: int):\n    return value\n");
        let outcome = review.finalize(&[]);
        assert_eq!(outcome.comments.len(), 2);
        assert_eq!(outcome.labels.add, vec![REQUIRE_TYPE_HINTS.to_string()]);
    }

    #[test]
    fn test_parse_failure_does_not_abort_other_files() {
        let files = vec![added("broken.py"), added("fine.py")];
        let mut review = PullRequestReview::new(&files);
        review.push_file("broken.py", "def broken(:\n");
        review.push_file("fine.py", "def solve(target: int) -> int:\n    return target\n");
        let outcome = review.finalize(&[]);
        // One parse-failure comment plus one doctest finding.
        assert_eq!(outcome.comments.len(), 2);
        assert_eq!(outcome.labels.add, vec![REQUIRE_DOCTESTS.to_string()]);
    }

    #[test]
    fn test_empty_file_set_yields_empty_outcome() {
        let review = PullRequestReview::new(&[]);
        let outcome = review.finalize(&[]);
        assert!(outcome.is_clean());
    }

    #[test]
    fn test_finding_kinds_flow_through_to_labels() {
        let files = vec![added("a.py"), added("test_a.py")];
        let mut review = PullRequestReview::new(&files);
        review.push_file("a.py", "def f(x: int) -> int:\n    return x\n");
        let outcome = review.finalize(&[]);
        assert_eq!(
            outcome.labels.add,
            vec![Requirement::MissingDescriptiveName.label().to_string()]
        );
    }
}
