//! GitHub API client for the quality gate.
//!
//! Authenticates as a GitHub App: a short-lived JWT is exchanged for a cached
//! per-installation access token, refreshed shortly before expiry.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{error, info};

use gatekeeper_core::{ChangedFile, LabelDelta, ReviewComment};

const API_ROOT: &str = "https://api.github.com";
const ACCEPT_JSON: &str = "application/vnd.github.v3+json";

/// Seconds of validity left below which a cached installation token is
/// discarded and refreshed.
const TOKEN_REFRESH_BUFFER_SECS: u64 = 300;

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    app_id: u64,
    private_key: String,
    token_cache: Arc<RwLock<HashMap<u64, (String, SystemTime)>>>,
}

/// Identifies one pull request across repositories and installations.
#[derive(Debug, Clone)]
pub struct PullRequestRef {
    pub installation_id: u64,
    pub repo_owner: String,
    pub repo_name: String,
    pub pr_number: u64,
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iss: u64,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelEntry {
    pub name: String,
}

/// The subset of the pull-request resource the handlers need.
#[derive(Debug, Deserialize)]
pub struct PullRequestDetails {
    pub number: u64,
    #[serde(default)]
    pub draft: bool,
    /// `None` while GitHub is still computing mergeability.
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub labels: Vec<LabelEntry>,
    #[serde(default)]
    pub author_association: String,
    pub head: PullRequestHead,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestHead {
    pub sha: String,
}

impl PullRequestDetails {
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|label| label.name.clone()).collect()
    }
}

#[derive(Debug, Deserialize)]
struct FileContentsResponse {
    content: String,
}

#[derive(Debug, Serialize)]
struct CreateReviewRequest<'a> {
    body: &'a str,
    event: &'a str,
    comments: &'a [ReviewComment],
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest<'a> {
    labels: &'a [String],
}

impl GitHubClient {
    pub fn new(app_id: u64, private_key: String) -> Self {
        let client = Client::builder()
            .user_agent(concat!("gatekeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            app_id,
            private_key,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn generate_jwt(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("Failed to get current time")?
            .as_secs();

        let claims = AppClaims {
            iss: self.app_id,
            iat: now - 60,  // Issued 60 seconds ago to account for clock skew
            exp: now + 600, // Expires in 10 minutes
        };

        let header = Header::new(Algorithm::RS256);
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .context("Failed to parse private key")?;

        encode(&header, &claims, &encoding_key).context("Failed to encode JWT")
    }

    async fn installation_token(&self, installation_id: u64) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some((token, expires_at)) = cache.get(&installation_id) {
                let remaining = expires_at
                    .duration_since(SystemTime::now())
                    .unwrap_or_default();
                if remaining > Duration::from_secs(TOKEN_REFRESH_BUFFER_SECS) {
                    return Ok(token.clone());
                }
            }
        }

        let jwt = self.generate_jwt()?;
        let url = format!("{API_ROOT}/app/installations/{installation_id}/access_tokens");

        info!("Requesting new installation access token");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {jwt}"))
            .header("Accept", ACCEPT_JSON)
            .send()
            .await
            .context("Failed to send installation token request")?;
        let response = expect_success(response, "requesting installation token").await?;

        let token_response: InstallationTokenResponse = response
            .json()
            .await
            .context("Failed to parse installation token response")?;

        let expires_at = chrono::DateTime::parse_from_rfc3339(&token_response.expires_at)
            .context("Failed to parse token expiration")?
            .with_timezone(&Utc);
        let expires_at_system =
            UNIX_EPOCH + Duration::from_secs(expires_at.timestamp() as u64);

        {
            let mut cache = self.token_cache.write().await;
            cache.insert(
                installation_id,
                (token_response.token.clone(), expires_at_system),
            );
        }

        Ok(token_response.token)
    }

    async fn request(
        &self,
        method: Method,
        installation_id: u64,
        url: &str,
    ) -> Result<RequestBuilder> {
        let token = self.installation_token(installation_id).await?;
        Ok(self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", ACCEPT_JSON))
    }

    pub async fn get_pull_request(&self, pr: &PullRequestRef) -> Result<PullRequestDetails> {
        let url = format!(
            "{API_ROOT}/repos/{}/{}/pulls/{}",
            pr.repo_owner, pr.repo_name, pr.pr_number
        );

        let response = self
            .request(Method::GET, pr.installation_id, &url)
            .await?
            .send()
            .await
            .context("Failed to send pull request fetch")?;
        let response = expect_success(response, "fetching pull request").await?;

        response
            .json()
            .await
            .context("Failed to parse pull request response")
    }

    /// All changed files of the pull request, in the order GitHub reports
    /// them, paginated to completion.
    pub async fn list_changed_files(&self, pr: &PullRequestRef) -> Result<Vec<ChangedFile>> {
        let mut all_files = Vec::new();
        let mut page = 1;
        let per_page = 100;

        loop {
            let url = format!(
                "{API_ROOT}/repos/{}/{}/pulls/{}/files?page={page}&per_page={per_page}",
                pr.repo_owner, pr.repo_name, pr.pr_number
            );

            let response = self
                .request(Method::GET, pr.installation_id, &url)
                .await?
                .send()
                .await
                .context("Failed to send changed files request")?;
            let response = expect_success(response, "listing changed files").await?;

            let files: Vec<ChangedFile> = response
                .json()
                .await
                .context("Failed to parse changed files response")?;
            let count = files.len();
            all_files.extend(files);

            if count < per_page {
                break;
            }
            page += 1;
        }

        info!(
            "PR #{} has {} changed files",
            pr.pr_number,
            all_files.len()
        );
        Ok(all_files)
    }

    /// Decoded text contents of one file at the given commit.
    pub async fn get_file_contents(
        &self,
        pr: &PullRequestRef,
        file_path: &str,
        sha: &str,
    ) -> Result<String> {
        let url = format!(
            "{API_ROOT}/repos/{}/{}/contents/{file_path}?ref={sha}",
            pr.repo_owner, pr.repo_name
        );

        let response = self
            .request(Method::GET, pr.installation_id, &url)
            .await?
            .send()
            .await
            .context("Failed to send file contents request")?;
        let response = expect_success(response, "fetching file contents").await?;

        let file_response: FileContentsResponse = response
            .json()
            .await
            .context("Failed to parse file contents response")?;

        let decoded = general_purpose::STANDARD
            .decode(file_response.content.replace('\n', ""))
            .context("Failed to decode base64 file content")?;
        String::from_utf8(decoded).context("File content is not valid UTF-8")
    }

    pub async fn add_labels(&self, pr: &PullRequestRef, labels: &[String]) -> Result<()> {
        let url = format!(
            "{API_ROOT}/repos/{}/{}/issues/{}/labels",
            pr.repo_owner, pr.repo_name, pr.pr_number
        );

        let response = self
            .request(Method::POST, pr.installation_id, &url)
            .await?
            .json(&AddLabelsRequest { labels })
            .send()
            .await
            .context("Failed to send add labels request")?;
        expect_success(response, "adding labels").await?;

        info!("Added labels {labels:?} to PR #{}", pr.pr_number);
        Ok(())
    }

    pub async fn remove_label(&self, pr: &PullRequestRef, label: &str) -> Result<()> {
        let url = format!(
            "{API_ROOT}/repos/{}/{}/issues/{}/labels/{label}",
            pr.repo_owner, pr.repo_name, pr.pr_number
        );

        let response = self
            .request(Method::DELETE, pr.installation_id, &url)
            .await?
            .send()
            .await
            .context("Failed to send remove label request")?;
        expect_success(response, "removing label").await?;

        info!("Removed label {label:?} from PR #{}", pr.pr_number);
        Ok(())
    }

    /// Apply a label delta computed by the core: removals first, then one
    /// batched addition.
    pub async fn apply_label_delta(&self, pr: &PullRequestRef, delta: &LabelDelta) -> Result<()> {
        for label in &delta.remove {
            self.remove_label(pr, label).await?;
        }
        if !delta.add.is_empty() {
            self.add_labels(pr, &delta.add).await?;
        }
        Ok(())
    }

    /// Submit one review carrying every line comment of the evaluation.
    pub async fn create_review(
        &self,
        pr: &PullRequestRef,
        body: &str,
        comments: &[ReviewComment],
    ) -> Result<()> {
        let url = format!(
            "{API_ROOT}/repos/{}/{}/pulls/{}/reviews",
            pr.repo_owner, pr.repo_name, pr.pr_number
        );

        let response = self
            .request(Method::POST, pr.installation_id, &url)
            .await?
            .json(&CreateReviewRequest {
                body,
                event: "COMMENT",
                comments,
            })
            .send()
            .await
            .context("Failed to send create review request")?;
        expect_success(response, "creating review").await?;

        info!(
            "Submitted review with {} comments on PR #{}",
            comments.len(),
            pr.pr_number
        );
        Ok(())
    }

    pub async fn post_issue_comment(&self, pr: &PullRequestRef, body: &str) -> Result<()> {
        let url = format!(
            "{API_ROOT}/repos/{}/{}/issues/{}/comments",
            pr.repo_owner, pr.repo_name, pr.pr_number
        );

        let response = self
            .request(Method::POST, pr.installation_id, &url)
            .await?
            .json(&CreateCommentRequest { body })
            .send()
            .await
            .context("Failed to send comment request")?;
        expect_success(response, "posting comment").await?;

        info!("Posted comment on PR #{}", pr.pr_number);
        Ok(())
    }

    pub async fn close_pull_request(&self, pr: &PullRequestRef) -> Result<()> {
        let url = format!(
            "{API_ROOT}/repos/{}/{}/pulls/{}",
            pr.repo_owner, pr.repo_name, pr.pr_number
        );

        let response = self
            .request(Method::PATCH, pr.installation_id, &url)
            .await?
            .json(&serde_json::json!({ "state": "closed" }))
            .send()
            .await
            .context("Failed to send close pull request request")?;
        expect_success(response, "closing pull request").await?;

        info!("Closed PR #{}", pr.pr_number);
        Ok(())
    }
}

async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    error!("GitHub API error {what}: {status} - {error_text}");
    Err(anyhow!("GitHub API error {what}: {status} - {error_text}"))
}
