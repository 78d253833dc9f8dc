//! GitHub API client for commit statuses.

use async_trait::async_trait;
use conveyor_core::{CommitStatus, Error, StatusClient};
use tracing::debug;

/// API root for github.com.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub API client.
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
}

impl GitHubClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            access_token: access_token.into(),
        }
    }

    /// Client for github.com, or for a GitHub Enterprise host when `domain`
    /// is set.
    pub fn for_domain(access_token: impl Into<String>, domain: Option<&str>) -> Self {
        Self::new(access_token).with_api_url(api_url_for(domain))
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Create a commit status on `owner/repo` at `sha`.
    pub async fn create_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        status: &CommitStatus,
    ) -> Result<(), GitHubError> {
        let url = format!(
            "{}/repos/{}/{}/statuses/{}",
            self.api_url, owner, repo, sha
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("User-Agent", "Conveyor")
            .header("Accept", "application/vnd.github+json")
            .json(status)
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let code = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api(format!(
                "Failed to create status ({}): {}",
                code, text
            )));
        }

        debug!(repo = %format!("{}/{}", owner, repo), sha = %sha, state = %status.state, "Created commit status");
        Ok(())
    }
}

/// API root for a GitHub host. Enterprise installs serve it under `/api/v3`.
pub fn api_url_for(domain: Option<&str>) -> String {
    match domain.map(str::trim).filter(|d| !d.is_empty()) {
        Some(domain) => format!("https://{}/api/v3", domain),
        None => DEFAULT_API_URL.to_string(),
    }
}

#[async_trait]
impl StatusClient for GitHubClient {
    async fn set_status(
        &self,
        repository: &str,
        sha: &str,
        status: &CommitStatus,
    ) -> conveyor_core::Result<()> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(format!("repository must be owner/name: {}", repository))
            })?;

        self.create_status(owner, repo, sha, status)
            .await
            .map_err(|e| Error::Status(e.to_string()))
    }
}

/// GitHub API errors.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Api(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use conveyor_core::CommitState;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(String, Option<String>, serde_json::Value)>>>;

    /// Serve a fake statuses endpoint on a local port, returning its base URL.
    async fn fake_github(reply: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::default();

        async fn create_status(
            State((captured, reply)): State<(Captured, StatusCode)>,
            Path((owner, repo, sha)): Path<(String, String, String)>,
            headers: HeaderMap,
            Json(body): Json<serde_json::Value>,
        ) -> StatusCode {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            captured
                .lock()
                .unwrap()
                .push((format!("{}/{}@{}", owner, repo, sha), auth, body));
            reply
        }

        let app = Router::new()
            .route("/repos/{owner}/{repo}/statuses/{sha}", post(create_status))
            .with_state((captured.clone(), reply));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), captured)
    }

    fn pending() -> CommitStatus {
        CommitStatus {
            state: CommitState::Pending,
            description: "Image building.".to_string(),
            context: "container/docker".to_string(),
            target_url: None,
        }
    }

    #[test]
    fn test_api_url_for_domain() {
        assert_eq!(api_url_for(None), "https://api.github.com");
        assert_eq!(api_url_for(Some("")), "https://api.github.com");
        assert_eq!(
            api_url_for(Some("github.example.com")),
            "https://github.example.com/api/v3"
        );
    }

    #[test]
    fn test_with_api_url_trims_slash() {
        let client = GitHubClient::new("token").with_api_url("http://localhost:1234/");
        assert_eq!(client.api_url(), "http://localhost:1234");
    }

    #[tokio::test]
    async fn test_set_status_posts_to_statuses_endpoint() {
        let (url, captured) = fake_github(StatusCode::CREATED).await;
        let client = GitHubClient::new("token123").with_api_url(url);

        client
            .set_status("remind101/acme-inc", "abcd", &pending())
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (target, auth, body) = &captured[0];
        assert_eq!(target, "remind101/acme-inc@abcd");
        assert_eq!(auth.as_deref(), Some("Bearer token123"));
        assert_eq!(body["state"], "pending");
        assert_eq!(body["description"], "Image building.");
        assert_eq!(body["context"], "container/docker");
        assert!(body.get("target_url").is_none());
    }

    #[tokio::test]
    async fn test_set_status_api_error() {
        let (url, _captured) = fake_github(StatusCode::UNPROCESSABLE_ENTITY).await;
        let client = GitHubClient::new("token123").with_api_url(url);

        let err = client
            .set_status("remind101/acme-inc", "abcd", &pending())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Status(msg) if msg.contains("422")));
    }

    #[tokio::test]
    async fn test_set_status_rejects_bad_repository() {
        let client = GitHubClient::new("token123");
        let err = client
            .set_status("acme-inc", "abcd", &pending())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
