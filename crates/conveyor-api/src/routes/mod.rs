//! API routes.

pub mod health;
pub mod webhooks;

use crate::AppState;
use axum::Router;
use axum::routing::post;

/// Build the server router with the webhook mounted at `webhook_path`.
pub fn router(state: AppState, webhook_path: &str) -> Router {
    let webhook_path = if webhook_path.starts_with('/') {
        webhook_path.to_string()
    } else {
        format!("/{}", webhook_path)
    };

    Router::new()
        .route(&webhook_path, post(webhooks::github_webhook))
        .merge(health::router())
        .with_state(state)
}
