//! Stage label state machine.
//!
//! A pull request carries at most one "stage" label describing where it sits
//! in the review lifecycle. The stage is never stored: it is reconstructed
//! from the current label set on every event, and transitions are expressed
//! as a [`LabelDelta`] for the API layer to apply.

use crate::labels::{
    LabelDelta, AWAITING_CHANGES, AWAITING_REVIEW, FAILED_CHECKS, INVALID, REQUIRE_DESCRIPTIVE_NAMES,
    REQUIRE_DOCTESTS, REQUIRE_TYPE_HINTS,
};

/// Marker identifying the stage label family.
const STAGE_MARKER: &str = "awaiting";

/// Labels that keep a freshly pushed pull request out of the review queue.
pub const BLOCKING_LABELS: &[&str] = &[
    FAILED_CHECKS,
    REQUIRE_DOCTESTS,
    REQUIRE_TYPE_HINTS,
    REQUIRE_DESCRIPTIVE_NAMES,
    INVALID,
];

/// The review-lifecycle stage of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// No stage label should be attached.
    #[default]
    None,
    AwaitingReview,
    AwaitingChanges,
}

impl Stage {
    pub fn label(self) -> Option<&'static str> {
        match self {
            Stage::None => None,
            Stage::AwaitingReview => Some(AWAITING_REVIEW),
            Stage::AwaitingChanges => Some(AWAITING_CHANGES),
        }
    }
}

/// Whether a label belongs to the stage family.
///
/// Unrecognized labels are simply not stage labels; malformed label data is
/// never an error.
pub fn is_stage_label(name: &str) -> bool {
    name.to_lowercase().contains(STAGE_MARKER)
}

/// Compute the label delta that moves the pull request to `requested`.
///
/// Idempotent: when a stage label equal to the requested one is already
/// attached, the result is a no-op so repeated events cause no API calls.
/// Otherwise every attached stage label is queued for removal (there should
/// be at most one, but drifted multi-labeled state is tolerated) and the
/// requested label, if any, is queued for addition.
pub fn advance(current_labels: &[String], requested: Stage) -> LabelDelta {
    let attached: Vec<&String> = current_labels
        .iter()
        .filter(|label| is_stage_label(label))
        .collect();

    if let Some(wanted) = requested.label() {
        if attached.iter().any(|label| label.as_str() == wanted) {
            return LabelDelta::default();
        }
    }

    let mut delta = LabelDelta {
        add: Vec::new(),
        remove: attached.into_iter().cloned().collect(),
    };
    if let Some(wanted) = requested.label() {
        delta.add.push(wanted.to_string());
    }
    delta
}

/// Lifecycle events that may drive a stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Opened { draft: bool },
    ReadyForReview,
    /// New commits were pushed to the head branch.
    Synchronized,
    /// A qualifying reviewer requested changes.
    ChangesRequested,
    /// A qualifying reviewer approved.
    Approved,
    /// Merged, or closed as invalid.
    Closed,
}

/// The stage an event asks for, or `None` when the event is a non-transition.
///
/// New commits only return the pull request to the review queue when no
/// blocking label is attached; those labels, not the stage label, reflect the
/// blocking condition.
pub fn requested_stage(event: LifecycleEvent, current_labels: &[String]) -> Option<Stage> {
    match event {
        LifecycleEvent::Opened { draft: true } => None,
        LifecycleEvent::Opened { draft: false } | LifecycleEvent::ReadyForReview => {
            Some(Stage::AwaitingReview)
        }
        LifecycleEvent::Synchronized => {
            let blocked = current_labels
                .iter()
                .any(|label| BLOCKING_LABELS.contains(&label.as_str()));
            if blocked {
                None
            } else {
                Some(Stage::AwaitingReview)
            }
        }
        LifecycleEvent::ChangesRequested => Some(Stage::AwaitingChanges),
        LifecycleEvent::Approved | LifecycleEvent::Closed => Some(Stage::None),
    }
}
