//! Webhook ingestion server for Conveyor.
//!
//! Accepts GitHub webhooks, turns pushes into builds on the build queue,
//! and provides the GitHub client used to report commit statuses.

pub mod error;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::router;
pub use services::github::GitHubClient;
pub use state::AppState;
