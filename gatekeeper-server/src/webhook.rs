use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::github::PullRequestRef;
use crate::handlers;
use crate::{AppState, CorrelationId};

#[derive(Debug, Deserialize)]
pub struct GitHubWebhookPayload {
    pub action: Option<String>,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    pub installation: Option<Installation>,
    pub review: Option<Review>,
    pub check_suite: Option<CheckSuite>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequest {
    pub number: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Review {
    pub state: String,
    pub author_association: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckSuite {
    pub conclusion: Option<String>,
    #[serde(default)]
    pub pull_requests: Vec<PullRequest>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub id: u64,
    pub login: String,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

type HmacSha256 = Hmac<Sha256>;

fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if !signature.starts_with("sha256=") {
        return false;
    }

    let signature_hex = &signature[7..]; // Remove "sha256=" prefix

    // Decode the hex signature to bytes
    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Use constant-time verification
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let correlation_id = CorrelationId(Uuid::new_v4().to_string());

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_github_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Make the correlation id available to the handler for log lines
    let mut new_request = Request::from_parts(parts, axum::body::Body::from(bytes));
    new_request.extensions_mut().insert(correlation_id);

    Ok(next.run(new_request).await)
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let event = request
        .headers()
        .get("x-github-event")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?
        .to_string();

    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let payload: GitHubWebhookPayload =
        serde_json::from_slice(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;

    info!(
        "[{correlation_id}] Received {event:?} webhook, action {:?}",
        payload.action
    );

    let message = dispatch(state, &event, payload);
    Ok(Json(WebhookResponse {
        message: message.to_string(),
    }))
}

/// Route an authenticated webhook to its background handler.
///
/// Handlers run in spawned tasks so the webhook delivery is acknowledged
/// immediately; GitHub redelivers on slow responses.
fn dispatch(state: Arc<AppState>, event: &str, payload: GitHubWebhookPayload) -> &'static str {
    let action = payload.action.as_deref().unwrap_or_default();

    match event {
        "ping" => "pong",
        "pull_request" => {
            let Some(pr_ref) = pull_request_ref(&payload, payload.pull_request.as_ref()) else {
                warn!("Missing repository, installation or pull request in payload");
                return "Ignoring incomplete payload";
            };
            match action {
                "opened" | "reopened" | "ready_for_review" => {
                    tokio::spawn(async move {
                        if let Err(e) = handlers::handle_opened(&state, &pr_ref).await {
                            error!("Failed to process opened PR #{}: {e:#}", pr_ref.pr_number);
                            return;
                        }
                        if let Err(e) = handlers::poll_mergeability(&state, &pr_ref).await {
                            error!(
                                "Failed to poll mergeability of PR #{}: {e:#}",
                                pr_ref.pr_number
                            );
                        }
                    });
                    "Processing opened pull request"
                }
                "synchronize" => {
                    tokio::spawn(async move {
                        if let Err(e) = handlers::handle_synchronized(&state, &pr_ref).await {
                            error!(
                                "Failed to process synchronized PR #{}: {e:#}",
                                pr_ref.pr_number
                            );
                            return;
                        }
                        if let Err(e) = handlers::poll_mergeability(&state, &pr_ref).await {
                            error!(
                                "Failed to poll mergeability of PR #{}: {e:#}",
                                pr_ref.pr_number
                            );
                        }
                    });
                    "Processing synchronized pull request"
                }
                "closed" => {
                    tokio::spawn(async move {
                        if let Err(e) = handlers::handle_closed(&state, &pr_ref).await {
                            error!("Failed to process closed PR #{}: {e:#}", pr_ref.pr_number);
                        }
                    });
                    "Processing closed pull request"
                }
                _ => "Ignoring pull request action",
            }
        }
        "pull_request_review" if action == "submitted" => {
            let Some(review) = payload.review.clone() else {
                warn!("Missing review in payload");
                return "Ignoring incomplete payload";
            };
            let Some(pr_ref) = pull_request_ref(&payload, payload.pull_request.as_ref()) else {
                warn!("Missing repository, installation or pull request in payload");
                return "Ignoring incomplete payload";
            };
            tokio::spawn(async move {
                if let Err(e) = handlers::handle_review_submitted(
                    &state,
                    &pr_ref,
                    &review.state,
                    &review.author_association,
                )
                .await
                {
                    error!(
                        "Failed to process review on PR #{}: {e:#}",
                        pr_ref.pr_number
                    );
                }
            });
            "Processing submitted review"
        }
        "check_suite" if action == "completed" => {
            let Some(suite) = payload.check_suite.clone() else {
                warn!("Missing check suite in payload");
                return "Ignoring incomplete payload";
            };
            let success = suite.conclusion.as_deref() == Some("success");
            for pr in &suite.pull_requests {
                let Some(pr_ref) = pull_request_ref(&payload, Some(pr)) else {
                    continue;
                };
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        handlers::handle_check_suite_completed(&state, &pr_ref, success).await
                    {
                        error!(
                            "Failed to process check suite for PR #{}: {e:#}",
                            pr_ref.pr_number
                        );
                    }
                });
            }
            "Processing completed check suite"
        }
        _ => "Ignoring event",
    }
}

fn pull_request_ref(
    payload: &GitHubWebhookPayload,
    pr: Option<&PullRequest>,
) -> Option<PullRequestRef> {
    let repo = payload.repository.as_ref()?;
    let installation = payload.installation.as_ref()?;
    Some(PullRequestRef {
        installation_id: installation.id,
        repo_owner: repo.owner.login.clone(),
        repo_name: repo.name.clone(),
        pr_number: pr?.number,
    })
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_signature_verification_accepts_valid_signature() {
        let secret = "test-secret";
        let payload = br#"{"action":"opened"}"#;
        let signature = sign(secret, payload);
        assert!(verify_github_signature(secret, payload, &signature));
    }

    #[test]
    fn test_signature_verification_rejects_tampered_payload() {
        let secret = "test-secret";
        let signature = sign(secret, br#"{"action":"opened"}"#);
        assert!(!verify_github_signature(
            secret,
            br#"{"action":"closed"}"#,
            &signature
        ));
    }

    #[test]
    fn test_signature_verification_rejects_wrong_scheme() {
        assert!(!verify_github_signature(
            "test-secret",
            b"payload",
            "sha1=deadbeef"
        ));
        assert!(!verify_github_signature(
            "test-secret",
            b"payload",
            "sha256=not-hex"
        ));
    }

    #[test]
    fn test_pull_request_payload_deserializes() {
        let payload = json!({
            "action": "opened",
            "pull_request": { "number": 42 },
            "repository": {
                "name": "algorithms",
                "full_name": "example/algorithms",
                "owner": { "id": 7, "login": "example" }
            },
            "installation": { "id": 12345 }
        });
        let parsed: GitHubWebhookPayload = serde_json::from_value(payload).unwrap();
        let pr_ref = pull_request_ref(&parsed, parsed.pull_request.as_ref()).unwrap();
        assert_eq!(pr_ref.installation_id, 12345);
        assert_eq!(pr_ref.repo_owner, "example");
        assert_eq!(pr_ref.repo_name, "algorithms");
        assert_eq!(pr_ref.pr_number, 42);
    }

    #[test]
    fn test_review_payload_deserializes() {
        let payload = json!({
            "action": "submitted",
            "review": { "state": "changes_requested", "author_association": "MEMBER" },
            "pull_request": { "number": 8 },
            "repository": {
                "name": "algorithms",
                "full_name": "example/algorithms",
                "owner": { "id": 7, "login": "example" }
            },
            "installation": { "id": 12345 }
        });
        let parsed: GitHubWebhookPayload = serde_json::from_value(payload).unwrap();
        let review = parsed.review.as_ref().unwrap();
        assert_eq!(review.state, "changes_requested");
        assert_eq!(review.author_association, "MEMBER");
    }

    #[test]
    fn test_check_suite_payload_deserializes() {
        let payload = json!({
            "action": "completed",
            "check_suite": {
                "conclusion": "failure",
                "pull_requests": [{ "number": 3 }, { "number": 4 }]
            },
            "repository": {
                "name": "algorithms",
                "full_name": "example/algorithms",
                "owner": { "id": 7, "login": "example" }
            },
            "installation": { "id": 12345 }
        });
        let parsed: GitHubWebhookPayload = serde_json::from_value(payload).unwrap();
        let suite = parsed.check_suite.as_ref().unwrap();
        assert_eq!(suite.conclusion.as_deref(), Some("failure"));
        assert_eq!(suite.pull_requests.len(), 2);
    }

    #[test]
    fn test_payload_without_pull_request_yields_no_ref() {
        let payload = json!({
            "action": "completed",
            "repository": {
                "name": "algorithms",
                "full_name": "example/algorithms",
                "owner": { "id": 7, "login": "example" }
            },
            "installation": { "id": 12345 }
        });
        let parsed: GitHubWebhookPayload = serde_json::from_value(payload).unwrap();
        assert!(pull_request_ref(&parsed, parsed.pull_request.as_ref()).is_none());
    }
}
