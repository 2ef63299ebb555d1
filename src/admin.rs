//! HTTP client for the application server's admin endpoints.
//!
//! Both endpoints are plain POSTs guarded by the admin bearer token that
//! devstack injects into the server as `ADMIN_TOKEN`.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Base URL of the locally running server.
pub const DEFAULT_URL: &str = "http://localhost:8080";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: admin token rejected")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),
}

/// Server reply to a sync trigger. Bodies are optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SyncResponse {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdminClient {
    base_url: String,
    token: String,
    client: Client,
}

impl AdminClient {
    /// Client for the server at `DEVSTACK_SERVER_URL` (default [`DEFAULT_URL`]).
    pub fn from_env(token: impl Into<String>) -> Self {
        let base_url =
            std::env::var("DEVSTACK_SERVER_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        Self::new(base_url, token)
    }

    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    /// Run a full state synchronization now.
    pub async fn trigger_sync(&self) -> Result<SyncResponse, AdminError> {
        self.post("/admin/sync").await
    }

    /// Re-run peer discovery now.
    pub async fn refresh_peers(&self) -> Result<SyncResponse, AdminError> {
        self.post("/admin/sync/peers").await
    }

    async fn post(&self, path: &str) -> Result<SyncResponse, AdminError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).bearer_auth(&self.token).send().await?;

        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            if body.trim().is_empty() {
                return Ok(SyncResponse::default());
            }
            Ok(serde_json::from_str(&body).unwrap_or_default())
        } else {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AdminError::Unauthorized),
                _ => Err(AdminError::Server(format!("{}: {}", status, body))),
            }
        }
    }
}
