//! Label vocabulary shared by the review engine and the stage state machine.
//!
//! The core never mutates a pull request's label set directly. Every component
//! computes a [`LabelDelta`] and hands it to the API layer to apply.

/// Stage label: the pull request is waiting for a maintainer review.
pub const AWAITING_REVIEW: &str = "awaiting review";
/// Stage label: a maintainer has requested changes from the author.
pub const AWAITING_CHANGES: &str = "awaiting changes";

/// Blocking label: one or more functions lack a doctest.
pub const REQUIRE_DOCTESTS: &str = "require doctests";
/// Blocking label: one or more parameters or return values lack annotations.
pub const REQUIRE_TYPE_HINTS: &str = "require type hints";
/// Blocking label: one or more identifiers are single letters.
pub const REQUIRE_DESCRIPTIVE_NAMES: &str = "require descriptive names";
/// Blocking label: CI checks failed on the head commit.
pub const FAILED_CHECKS: &str = "failed checks";
/// Blocking label: the submission violates repository rules (e.g. bad file types).
pub const INVALID: &str = "invalid";

/// The pull request cannot be merged cleanly into its base branch.
pub const MERGE_CONFLICT: &str = "merge conflict";

/// Content-type label: the change touches documentation files.
pub const DOCUMENTATION: &str = "documentation";
/// Content-type label: the change modifies existing code.
pub const ENHANCEMENT: &str = "enhancement";

/// One missing engineering requirement, as detected on a syntax element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    MissingDoctest,
    MissingTypeHint,
    MissingReturnTypeHint,
    MissingDescriptiveName,
}

impl Requirement {
    /// The label this requirement maps to.
    ///
    /// Parameter and return type hints are one requirement family: they share
    /// a single label.
    pub fn label(self) -> &'static str {
        match self {
            Requirement::MissingDoctest => REQUIRE_DOCTESTS,
            Requirement::MissingTypeHint | Requirement::MissingReturnTypeHint => {
                REQUIRE_TYPE_HINTS
            }
            Requirement::MissingDescriptiveName => REQUIRE_DESCRIPTIVE_NAMES,
        }
    }
}

/// A requested change to a pull request's label set.
///
/// The delta is minimal by construction: callers building one via
/// [`toggle_delta`] or the aggregator never queue a label that is already in
/// the desired state, and never queue the same label for both add and remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDelta {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl LabelDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Fold another delta into this one.
    pub fn extend(&mut self, other: LabelDelta) {
        self.add.extend(other.add);
        self.remove.extend(other.remove);
    }
}

/// Reconcile a single label against a desired presence flag.
///
/// Adds the label when wanted and absent, removes it when unwanted and
/// present, and produces an empty delta otherwise so repeated events do not
/// trigger redundant API calls.
pub fn toggle_delta(label: &str, wanted: bool, current_labels: &[String]) -> LabelDelta {
    let present = current_labels.iter().any(|l| l == label);
    let mut delta = LabelDelta::default();
    if wanted && !present {
        delta.add.push(label.to_string());
    } else if !wanted && present {
        delta.remove.push(label.to_string());
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_type_hint_family_shares_one_label() {
        assert_eq!(
            Requirement::MissingTypeHint.label(),
            Requirement::MissingReturnTypeHint.label()
        );
    }

    #[test]
    fn test_toggle_adds_when_wanted_and_absent() {
        let delta = toggle_delta(MERGE_CONFLICT, true, &labels(&[ENHANCEMENT]));
        assert_eq!(delta.add, vec![MERGE_CONFLICT.to_string()]);
        assert!(delta.remove.is_empty());
    }

    #[test]
    fn test_toggle_removes_when_unwanted_and_present() {
        let delta = toggle_delta(MERGE_CONFLICT, false, &labels(&[MERGE_CONFLICT]));
        assert!(delta.add.is_empty());
        assert_eq!(delta.remove, vec![MERGE_CONFLICT.to_string()]);
    }

    #[test]
    fn test_toggle_is_idempotent() {
        assert!(toggle_delta(FAILED_CHECKS, true, &labels(&[FAILED_CHECKS])).is_empty());
        assert!(toggle_delta(FAILED_CHECKS, false, &labels(&[])).is_empty());
    }

    #[test]
    fn test_toggle_never_queues_both_directions() {
        for wanted in [true, false] {
            for current in [labels(&[]), labels(&[FAILED_CHECKS])] {
                let delta = toggle_delta(FAILED_CHECKS, wanted, &current);
                assert!(delta.add.is_empty() || delta.remove.is_empty());
            }
        }
    }
}
