//! Push gateway client: credential exchange and per-recipient fan-out
//!
//! The service credential is a static JSON asset loaded once; it is
//! exchanged for a short-lived bearer token which is cached and refreshed
//! only when expired. Delivery is best effort: one independent call per
//! recipient token, no retry, no batching, failures collected rather than
//! raised.

use std::future::Future;
use std::path::Path;

use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, Scope, TokenResponse, TokenUrl};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::auth::StoredToken;

/// Failures that abort a whole `notify_members` call. Per-token delivery
/// failures are not here; they are collected in the report instead.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("push credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("push credential refresh failed: {0}")]
    CredentialExpiredRefreshFailed(String),
}

/// One recipient the gateway could not reach. Logged and skipped; never
/// surfaced to the message author.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub token: String,
    pub status: Option<u16>,
    pub reason: String,
}

/// Outcome of one fan-out: how many recipients were delivered to and
/// which ones failed.
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

/// Metadata attached to every push so the receiving device can attribute
/// it to an organization.
#[derive(Debug, Clone)]
pub struct PushData {
    pub org_id: String,
    pub org_name: String,
}

/// Service credential asset: `{client_id, client_secret, token_uri}`,
/// optionally a scope.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceCredential {
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// The outbound delivery seam. One implementation speaks HTTP to the
/// gateway; tests substitute their own.
pub trait PushSender: Clone + Send + Sync + 'static {
    fn send_one(
        &self,
        token: String,
        payload: Value,
    ) -> impl Future<Output = Result<(), DeliveryFailure>> + Send;
}

/// The per-recipient request body.
fn push_payload(token: &str, title: &str, body: &str, data: &PushData) -> Value {
    json!({
        "message": {
            "token": token,
            "notification": { "title": title, "body": body },
            "data": { "orgId": data.org_id, "orgName": data.org_name },
        }
    })
}

/// Deliver to every token, each in its own task so a slow recipient
/// delays no one. Ordering across tokens is unspecified. Failures are
/// logged and collected; the report is the only place they show up.
pub async fn fan_out<S: PushSender>(
    sender: &S,
    tokens: &[String],
    title: &str,
    body: &str,
    data: &PushData,
) -> FanoutReport {
    let mut handles = Vec::with_capacity(tokens.len());
    for token in tokens {
        let s = sender.clone();
        let payload = push_payload(token, title, body, data);
        let t = token.clone();
        handles.push((
            token.clone(),
            tokio::spawn(async move { s.send_one(t, payload).await }),
        ));
    }

    let mut report = FanoutReport::default();
    for (token, handle) in handles {
        match handle.await {
            Ok(Ok(())) => report.delivered += 1,
            Ok(Err(failure)) => {
                tracing::warn!(
                    "push delivery failed for {} (status {:?}): {}",
                    failure.token,
                    failure.status,
                    failure.reason
                );
                report.failures.push(failure);
            }
            Err(e) => {
                report.failures.push(DeliveryFailure {
                    token,
                    status: None,
                    reason: format!("delivery task failed: {e}"),
                });
            }
        }
    }
    report
}

/// HTTP sender carrying the bearer token for one fan-out.
#[derive(Clone)]
struct HttpPushSender {
    http: reqwest::Client,
    endpoint: String,
    bearer: String,
}

impl PushSender for HttpPushSender {
    async fn send_one(&self, token: String, payload: Value) -> Result<(), DeliveryFailure> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.bearer)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryFailure {
                token: token.clone(),
                status: None,
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(DeliveryFailure {
            token,
            status: Some(status.as_u16()),
            reason: body,
        })
    }
}

/// Authenticated push gateway client.
#[derive(Debug)]
pub struct PushGatewayClient {
    http: reqwest::Client,
    endpoint: String,
    credential: ServiceCredential,
    bearer: Mutex<Option<StoredToken>>,
}

impl PushGatewayClient {
    /// Load the service credential asset. A missing or unreadable asset
    /// is fatal for every subsequent call.
    pub fn load(credential_path: &Path, endpoint: String) -> Result<Self, PushError> {
        let raw = std::fs::read_to_string(credential_path).map_err(|e| {
            PushError::CredentialUnavailable(format!("{}: {e}", credential_path.display()))
        })?;
        let credential: ServiceCredential = serde_json::from_str(&raw).map_err(|e| {
            PushError::CredentialUnavailable(format!("{}: {e}", credential_path.display()))
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            credential,
            bearer: Mutex::new(None),
        })
    }

    /// Current bearer token, exchanging the credential only when the
    /// cached one is missing or expired.
    async fn bearer(&self) -> Result<String, PushError> {
        let mut cached = self.bearer.lock().await;
        if let Some(ref token) = *cached {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        tracing::debug!("refreshing push gateway bearer token");
        let client = BasicClient::new(
            ClientId::new(self.credential.client_id.clone()),
            Some(ClientSecret::new(self.credential.client_secret.clone())),
            AuthUrl::new(self.credential.token_uri.clone())
                .map_err(|e| PushError::CredentialUnavailable(e.to_string()))?,
            Some(
                TokenUrl::new(self.credential.token_uri.clone())
                    .map_err(|e| PushError::CredentialUnavailable(e.to_string()))?,
            ),
        );

        let mut request = client.exchange_client_credentials();
        if let Some(ref scope) = self.credential.scope {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let response = request
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| PushError::CredentialExpiredRefreshFailed(format!("{e}")))?;

        let token = StoredToken::new(
            response.access_token().secret().to_string(),
            response.expires_in().map(|d| d.as_secs()),
        );
        let secret = token.token.clone();
        *cached = Some(token);
        Ok(secret)
    }

    /// Notify every recipient token. Succeeds as long as the credential
    /// step succeeded; per-token failures end up in the report only.
    pub async fn notify_members(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &PushData,
    ) -> Result<FanoutReport, PushError> {
        if tokens.is_empty() {
            return Ok(FanoutReport::default());
        }

        let bearer = self.bearer().await?;
        let sender = HttpPushSender {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            bearer,
        };
        Ok(fan_out(&sender, tokens, title, body, data).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Clone)]
    struct MockSender {
        sent: Arc<StdMutex<Vec<String>>>,
        fail_token: &'static str,
    }

    impl PushSender for MockSender {
        async fn send_one(&self, token: String, _payload: Value) -> Result<(), DeliveryFailure> {
            if token == self.fail_token {
                return Err(DeliveryFailure {
                    token,
                    status: Some(400),
                    reason: "Bad Request".into(),
                });
            }
            self.sent.lock().unwrap().push(token);
            Ok(())
        }
    }

    fn data() -> PushData {
        PushData {
            org_id: "o1".into(),
            org_name: "Acme".into(),
        }
    }

    #[test]
    fn test_push_payload_shape() {
        let v = push_payload("tok-1", "Acme", "Midterm Friday", &data());
        assert_eq!(v["message"]["token"], "tok-1");
        assert_eq!(v["message"]["notification"]["title"], "Acme");
        assert_eq!(v["message"]["notification"]["body"], "Midterm Friday");
        assert_eq!(v["message"]["data"]["orgId"], "o1");
        assert_eq!(v["message"]["data"]["orgName"], "Acme");
    }

    #[tokio::test]
    async fn test_fan_out_isolates_per_token_failures() {
        let sender = MockSender {
            sent: Arc::new(StdMutex::new(Vec::new())),
            fail_token: "tok-2",
        };
        let tokens = vec!["tok-1".to_string(), "tok-2".to_string(), "tok-3".to_string()];

        let report = fan_out(&sender, &tokens, "Acme", "hello", &data()).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].token, "tok-2");
        assert_eq!(report.failures[0].status, Some(400));

        let mut sent = sender.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent, vec!["tok-1".to_string(), "tok-3".to_string()]);
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let err = PushGatewayClient::load(
            Path::new("/nonexistent/credential.json"),
            "https://push.example/v1/messages:send".into(),
        )
        .unwrap_err();
        assert!(matches!(err, PushError::CredentialUnavailable(_)));
    }

    #[test]
    fn test_credential_parse() {
        let cred: ServiceCredential = serde_json::from_str(
            r#"{"client_id":"svc","client_secret":"s3cret","token_uri":"https://auth.example/token"}"#,
        )
        .unwrap();
        assert_eq!(cred.client_id, "svc");
        assert!(cred.scope.is_none());
    }
}
