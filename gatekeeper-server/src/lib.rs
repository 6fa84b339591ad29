//! GitHub App shell around the review engine.
//!
//! Receives webhooks, authenticates as the App installation, fetches pull
//! request data, and applies the label deltas and review comments the
//! engine computes.

pub mod config;
pub mod github;
pub mod handlers;
pub mod webhook;

pub use github::{GitHubClient, PullRequestRef};

pub fn get_bot_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Per-delivery id threaded through log lines so concurrent webhook
/// deliveries can be told apart.
#[derive(Debug, Clone, Default)]
pub struct CorrelationId(pub String);

pub struct AppState {
    pub github_client: GitHubClient,
    pub webhook_secret: String,
}
