//! REST boundary for board snapshots and sticker mutations.
//!
//! ERROR HANDLING
//! ==============
//! Every call returns [`ApiError`]. Non-2xx responses keep the status and
//! body so callers can log what the server said; the sync driver treats any
//! error as a rejection of the mutation it was submitting.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::cell::RefCell;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;
use wire::{BoardSnapshot, StickerDraft, StickerFields, StickerPayload};

use crate::config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT};
use crate::sync::{BoardSyncClient, OutboundMutation};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("missing auth token; pass --token or set STICKERBOARD_TOKEN")]
    MissingToken,
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status of a non-2xx response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Authenticated client for the board REST API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    /// Client whose requests time out after [`DEFAULT_REQUEST_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingToken`] without a non-empty token and
    /// [`ApiError::InvalidBaseUrl`] when `base_url` is not an http(s) URL.
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, token, DEFAULT_REQUEST_TIMEOUT)
    }

    /// # Errors
    ///
    /// See [`ApiClient::new`].
    pub fn with_timeout(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, ApiError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(ApiError::MissingToken)?;
        let parsed = Url::parse(base_url).map_err(|_| ApiError::InvalidBaseUrl(base_url.to_owned()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidBaseUrl(base_url.to_owned()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: parsed, token: token.to_owned() })
    }

    /// # Errors
    ///
    /// See [`ApiClient::new`].
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::with_timeout(&config.base_url, config.token.as_deref(), config.request_timeout)
    }

    /// `GET /api/v1/boards/{board_id}`: metadata, stickers and permission.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-2xx status or an
    /// undecodable body.
    pub async fn fetch_board(&self, board_id: i64) -> Result<BoardSnapshot, ApiError> {
        let path = format!("api/v1/boards/{board_id}");
        self.request_json(Method::GET, &path, None::<&()>).await
    }

    /// `POST /api/v1/boards/{board_id}/stickers`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::fetch_board`].
    pub async fn create_sticker(&self, board_id: i64, draft: &StickerDraft) -> Result<StickerPayload, ApiError> {
        let path = format!("api/v1/boards/{board_id}/stickers");
        self.request_json(Method::POST, &path, Some(draft)).await
    }

    /// `PATCH /api/v1/boards/{board_id}/stickers/{sticker_id}`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::fetch_board`].
    pub async fn patch_sticker(
        &self,
        board_id: i64,
        sticker_id: i64,
        fields: &StickerFields,
    ) -> Result<StickerPayload, ApiError> {
        let path = format!("api/v1/boards/{board_id}/stickers/{sticker_id}");
        self.request_json(Method::PATCH, &path, Some(fields)).await
    }

    /// `DELETE /api/v1/boards/{board_id}/stickers/{sticker_id}`; the server answers 204.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::fetch_board`].
    pub async fn delete_sticker(&self, board_id: i64, sticker_id: i64) -> Result<(), ApiError> {
        let path = format!("api/v1/boards/{board_id}/stickers/{sticker_id}");
        self.send(Method::DELETE, &path, None::<&()>).await.map(|_| ())
    }

    /// Perform one queued mutation. A create or patch returns the sticker
    /// the server stored.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::fetch_board`].
    pub async fn submit(&self, board_id: i64, mutation: &OutboundMutation) -> Result<Option<StickerPayload>, ApiError> {
        match mutation {
            OutboundMutation::Create { draft, .. } => self.create_sticker(board_id, draft).await.map(Some),
            OutboundMutation::Patch { sticker_id, fields, .. } => {
                self.patch_sticker(board_id, *sticker_id, fields).await.map(Some)
            }
            OutboundMutation::Delete { sticker_id, .. } => {
                self.delete_sticker(board_id, *sticker_id).await.map(|()| None)
            }
        }
    }

    async fn request_json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.send(method, path, body).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<String, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = endpoint(&self.base_url, path);
        tracing::debug!(%method, %url, "api request");

        let request = self.http.request(method, url).bearer_auth(&self.token);
        let request = if let Some(body) = body { request.json(body) } else { request };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), body: text });
        }
        Ok(text)
    }
}

/// Drain the client's outbound queue through `api` until it is empty,
/// acknowledging or rejecting each mutation. Returns how many were rejected.
pub async fn submit_outbound(client: &RefCell<BoardSyncClient>, api: &ApiClient, board_id: i64) -> usize {
    let mut rejected = 0;
    loop {
        let drained = client.borrow_mut().drain_outbound();
        if drained.is_empty() {
            return rejected;
        }
        for mutation in drained {
            let request = mutation.request();
            match api.submit(board_id, &mutation).await {
                Ok(response) => {
                    client.borrow_mut().acknowledge(request, response);
                }
                Err(e) => {
                    tracing::warn!(board_id, %request, error = %e, "sticker mutation rejected");
                    client.borrow_mut().reject(request);
                    rejected += 1;
                }
            }
        }
    }
}

/// Resolve `path` under the base URL, keeping any path prefix it carries.
fn endpoint(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    let prefix = base_url.path().trim_end_matches('/');
    url.set_path(&format!("{prefix}/{}", path.trim_start_matches('/')));
    url.set_query(None);
    url
}
