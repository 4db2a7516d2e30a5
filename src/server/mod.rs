//! The light-merge HTTP service.
//!
//! GitLab deliveries are checked and turned into [`CommandJob`]s by
//! [`webhook_handler`]; a single [`Dispatcher`] runs them against
//! per-project working copies.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Accepts GitLab webhook deliveries (returns 200)
//! - `GET /health` - Returns 200 while commands are being accepted

use std::sync::Arc;

use tokio::sync::mpsc;

pub mod dispatch;
pub mod health;
pub mod locks;
pub mod webhook;

pub use dispatch::{CommandJob, Dispatcher};
pub use health::health_handler;
pub use locks::RepoLocks;
pub use webhook::webhook_handler;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Expected `X-Gitlab-Token`, if any.
    webhook_secret: Option<Vec<u8>>,

    /// Queue drained by [`Dispatcher::run`].
    jobs: mpsc::UnboundedSender<CommandJob>,
}

impl AppState {
    pub fn new(webhook_secret: Option<Vec<u8>>, jobs: mpsc::UnboundedSender<CommandJob>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                webhook_secret,
                jobs,
            }),
        }
    }

    pub fn webhook_secret(&self) -> Option<&[u8]> {
        self.inner.webhook_secret.as_deref()
    }

    /// Queues a command. Returns false if the dispatcher is gone.
    pub fn submit(&self, job: CommandJob) -> bool {
        self.inner.jobs.send(job).is_ok()
    }

    pub fn is_accepting(&self) -> bool {
        !self.inner.jobs.is_closed()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
