//! GitHub webhook endpoint.
//!
//! `ping` deliveries are acknowledged. `push` deliveries become builds on
//! the build queue unless the push came from a fork or deleted a branch.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::error::ApiError;
use conveyor_core::build::no_cache;
use conveyor_core::{BuildContext, BuildOptions};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

const BRANCH_PREFIX: &str = "refs/heads/";

/// Fields of a push payload used to start a build.
#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    deleted: bool,
    head_commit: Option<HeadCommit>,
    repository: PushRepository,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    id: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct PushRepository {
    full_name: String,
    #[serde(default)]
    fork: bool,
}

/// Handle a GitHub webhook delivery.
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if let Some(secret) = &state.secret {
        let signature = headers.get(HEADER_SIGNATURE).and_then(|v| v.to_str().ok());
        if !verify_github_signature(secret, &body, signature) {
            warn!("Invalid webhook signature");
            return Err(ApiError::Unauthorized("invalid signature".to_string()));
        }
    }

    let event_type = headers
        .get(HEADER_EVENT)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing X-GitHub-Event header".to_string()))?;

    match event_type {
        "ping" => {
            info!("Ping event received - webhook is configured correctly");
            Ok(StatusCode::OK.into_response())
        }
        "push" => handle_push(&state, &body).await,
        other => {
            debug!(event = %other, "Unsupported event type");
            Err(ApiError::BadRequest(format!("unsupported event: {}", other)))
        }
    }
}

/// Queue a build for a push, returning its id as the response body.
async fn handle_push(state: &AppState, body: &[u8]) -> Result<Response, ApiError> {
    let event: PushEvent = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid push payload: {}", e)))?;

    let repository = event.repository.full_name;

    if event.repository.fork {
        info!(repo = %repository, "Ignoring push to fork");
        return Ok(StatusCode::OK.into_response());
    }

    if event.deleted {
        info!(repo = %repository, git_ref = %event.git_ref, "Ignoring deleted ref");
        return Ok(StatusCode::OK.into_response());
    }

    let head_commit = event
        .head_commit
        .ok_or_else(|| ApiError::BadRequest("push has no head commit".to_string()))?;

    let queue = state
        .queue
        .as_ref()
        .ok_or_else(|| ApiError::Internal("no build queue configured".to_string()))?;

    let branch = event
        .git_ref
        .strip_prefix(BRANCH_PREFIX)
        .unwrap_or(&event.git_ref);

    let id = (state.new_id)();
    let options = BuildOptions::new(id, repository, branch, head_commit.id)
        .with_no_cache(no_cache(&head_commit.message));

    let ctx = match state.timeout {
        Some(timeout) => BuildContext::with_timeout(timeout),
        None => BuildContext::new(),
    };

    info!(
        build_id = %id,
        repo = %options.repository,
        branch = %options.branch,
        sha = %options.sha,
        no_cache = options.no_cache,
        "Queueing build"
    );

    queue.push(ctx, options).await.map_err(|e| {
        warn!(build_id = %id, error = %e, "Failed to queue build");
        ApiError::from(e)
    })?;

    Ok((StatusCode::OK, id.to_string()).into_response())
}

/// Verify GitHub webhook signature.
fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    // Signature format: "sha256=<hex>"
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}
