//! Pull-request code-quality review engine.
//!
//! Pure, synchronous core: given the changed files of one pull request and
//! their contents, it classifies files, walks each source file's syntax tree
//! for missing requirements, merges findings into review comments and
//! computes label deltas. All I/O lives in the surrounding collaborator.

pub mod aggregator;
pub mod files;
pub mod labels;
pub mod mergeable;
pub mod review;
pub mod stage;
pub mod visitor;

pub use aggregator::{ReviewAggregator, ReviewComment, ReviewOutcome, Side};
pub use files::{ChangedFile, ClassifierConfig, FileClassifier, FileStatus};
pub use labels::{LabelDelta, Requirement};
pub use review::PullRequestReview;
pub use stage::{advance, requested_stage, LifecycleEvent, Stage};
pub use visitor::{Finding, ParseFailure, SubjectKind};
