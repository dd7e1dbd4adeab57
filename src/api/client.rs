//! Authenticated HTTP client for the Herald document store
//!
//! Wraps reqwest::Client with session bearer injection and maps HTTP
//! statuses onto the typed store error taxonomy.

use serde_json::Value;

use super::StoreError;
use crate::config::Config;

/// Authenticated store client. Cheap to clone; the underlying reqwest
/// client is shared.
#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base: String,
    token: String,
    uid: String,
}

impl StoreClient {
    /// Load config and build a client. Fails with `NotAuthenticated` when
    /// no valid session token is stored.
    pub fn new() -> Result<Self, StoreError> {
        let config = Config::load().map_err(|e| StoreError::Transport(format!("{e:#}")))?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let token = match config.get_session_token() {
            Some(t) if !t.is_expired() => t.token,
            _ => return Err(StoreError::NotAuthenticated),
        };
        let uid = config.uid().ok_or(StoreError::NotAuthenticated)?;

        Ok(Self {
            http: reqwest::Client::new(),
            base: config.store_url(),
            token,
            uid,
        })
    }

    /// The authenticated user's id.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    #[cfg(test)]
    pub(crate) fn for_tests(base: &str, uid: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.to_string(),
            token: "test-token".to_string(),
            uid: uid.to_string(),
        }
    }

    /// GET a store path, e.g. `/organizations?owner=u1`.
    pub async fn get(&self, path_and_query: &str) -> Result<Value, StoreError> {
        let url = format!("{}{}", self.base, path_and_query);
        tracing::debug!("store GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("GET {url} failed: {e}")))?;

        check_response(resp, &url).await
    }

    /// POST a mutation. The store applies array mutations (`:add`,
    /// `:append`, `:remove` paths) as merges, never whole-array writes.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, StoreError> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("store POST {}", url);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("POST {url} failed: {e}")))?;

        check_response(resp, &url).await
    }

    /// PATCH scalar fields of a record.
    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, StoreError> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("store PATCH {}", url);

        let resp = self
            .http
            .patch(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("PATCH {url} failed: {e}")))?;

        check_response(resp, &url).await
    }
}

/// URL-encode a query value.
pub(crate) fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Map the HTTP status onto the store error taxonomy, parsing the body as
/// JSON on success. 2xx responses with no body yield `null`.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<Value, StoreError> {
    let status = resp.status();
    match status.as_u16() {
        200..=299 => {}
        401 => return Err(StoreError::NotAuthenticated),
        403 => return Err(StoreError::Unauthorized),
        404 => return Err(StoreError::NotFound),
        409 => return Err(StoreError::AlreadyExists),
        code => {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Transport(format!("HTTP {code} for {url}: {body}")));
        }
    }

    let text = resp
        .text()
        .await
        .map_err(|e| StoreError::Transport(format!("read body for {url}: {e}")))?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| StoreError::Malformed(format!("{url}: {e}")))
}
