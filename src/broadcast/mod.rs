//! Message broadcast: durable append, then best-effort push fan-out
//!
//! The append is the only part the sender is told about. Fan-out runs in
//! its own task after a successful append; its outcome is logged, never
//! surfaced, and a failed push does not roll anything back. The write
//! gate (owner-only) is the caller's responsibility; `append` itself
//! does not re-derive membership.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use thiserror::Error;

use crate::api::client::encode;
use crate::api::{fetch_organization, fetch_users, StoreClient, StoreError};
use crate::config::Config;
use crate::models::{Message, Organization};
use crate::push::{PushData, PushGatewayClient};

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("no target organization")]
    InvalidTarget,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Acknowledgement of a durable append.
#[derive(Debug, Clone, Copy)]
pub struct Ack {
    pub timestamp: i64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Append one message to an organization's log. The store applies the
/// append as a merge, so concurrent appends from different senders all
/// survive. Returns as soon as the append is durable.
pub async fn append(
    client: &StoreClient,
    org_id: &str,
    sender: &str,
    content: &str,
) -> Result<Ack, BroadcastError> {
    if org_id.trim().is_empty() {
        return Err(BroadcastError::InvalidTarget);
    }

    let message = Message {
        content: content.to_string(),
        sender: sender.to_string(),
        timestamp: now_ms(),
    };

    client
        .post(
            &format!("/organizations/{}/messages:append", encode(org_id)),
            &serde_json::to_value(&message).map_err(|e| StoreError::Malformed(e.to_string()))?,
        )
        .await?;

    Ok(Ack {
        timestamp: message.timestamp,
    })
}

/// Member push tokens for a fan-out. Lookup failures are swallowed into
/// an empty list: a missing notification, never a failed broadcast.
async fn collect_member_tokens(client: &StoreClient, org: &Organization) -> Vec<String> {
    match fetch_users(client, &org.members).await {
        Ok(users) => users
            .into_iter()
            .map(|u| u.push_token)
            .filter(|t| !t.is_empty())
            .collect(),
        Err(e) => {
            tracing::warn!("member lookup failed, skipping fan-out: {}", e);
            Vec::new()
        }
    }
}

/// Spawn the push fan-out for an appended message. Returns the task
/// handle so a short-lived process can wait for delivery to finish; the
/// outcome itself is only ever logged.
pub fn spawn_fanout(
    config: &Config,
    client: StoreClient,
    org: Organization,
    content: String,
) -> Option<tokio::task::JoinHandle<()>> {
    let gateway = match PushGatewayClient::load(&config.credential_path(), config.push_endpoint()) {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::warn!("push fan-out skipped: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        let tokens = collect_member_tokens(&client, &org).await;
        if tokens.is_empty() {
            tracing::debug!("no member tokens for {}, nothing to fan out", org.name);
            return;
        }

        let data = PushData {
            org_id: org.id.clone(),
            org_name: org.name.clone(),
        };
        match gateway.notify_members(&tokens, &org.name, &content, &data).await {
            Ok(report) => {
                tracing::info!(
                    "push fan-out for {}: {} delivered, {} failed",
                    org.name,
                    report.delivered,
                    report.failures.len()
                );
            }
            Err(e) => {
                tracing::warn!("push fan-out for {} failed: {}", org.name, e);
            }
        }
    }))
}

/// The `send` command: gate, append, fan out, report.
pub async fn send_announcement(org_id: &str, content: &str) -> Result<()> {
    let config = Config::load()?;
    let client = StoreClient::from_config(&config)?;

    let org = fetch_organization(&client, org_id).await?;
    if !org.can_write(client.uid()) {
        anyhow::bail!("Only the owner of {} may send announcements.", org.name);
    }

    let sender = client.uid().to_string();
    let ack = append(&client, &org.id, &sender, content).await?;
    tracing::debug!("append acknowledged at {}", ack.timestamp);
    println!("Announcement sent.");

    // Keep the process alive until delivery settles; the result is logged
    // only.
    if let Some(handle) = spawn_fanout(&config, client, org, content.to_string()) {
        let _ = handle.await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_target_rejected_before_io() {
        let client = StoreClient::for_tests("http://store.invalid/v1", "u1");
        let err = tokio_test::block_on(append(&client, "  ", "u1", "hello")).unwrap_err();
        assert!(matches!(err, BroadcastError::InvalidTarget));
    }

    #[test]
    fn test_append_body_is_single_message() {
        // The append op carries one message object, not the whole log.
        let message = Message {
            content: "Midterm Friday".into(),
            sender: "u1".into(),
            timestamp: 42,
        };
        let v = serde_json::to_value(&message).unwrap();
        assert!(v.is_object());
        assert_eq!(v["content"], "Midterm Friday");
        assert_eq!(v["senderId"], "u1");
        assert!(v.get("messages").is_none());
    }
}
