//! Device push inbox
//!
//! Connects the installation's delivery socket and feeds received pushes
//! through the notification batcher. The same socket carries unsolicited
//! token-rotation frames from the platform; those update the registry and
//! trigger a re-sync.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::time;

use super::batcher::{NotificationBatcher, PushPayload, TerminalSink};
use crate::api::client::encode;
use crate::api::StoreClient;
use crate::config::Config;
use crate::device::DeviceTokenRegistry;
use crate::watch::socket::WatchSocket;

/// Reason the inner connection loop exited.
enum DisconnectReason {
    /// Clean shutdown (Ctrl+C). Do not reconnect.
    Shutdown,
    /// Error or server-initiated close. Should reconnect.
    Error(anyhow::Error),
}

/// Run the inbox with automatic reconnection (backoff 1s doubling to
/// 64s, reset after a stable minute).
pub async fn run_inbox() -> Result<()> {
    let mut config = Config::load().context("Failed to load config")?;
    let mut device_token = config.ensure_device_token();
    config.save()?;

    let uid = config.uid();
    let registry = match StoreClient::from_config(&config) {
        Ok(client) => Some(DeviceTokenRegistry::new(client, device_token.clone())),
        Err(e) => {
            tracing::warn!("token sync disabled: {}", e);
            None
        }
    };

    if let Some(ref registry) = registry {
        let outcome = registry.sync_if_changed(uid.as_deref()).await;
        tracing::info!("device token sync on start: {:?}", outcome);
    }

    let inbox_url = config.inbox_url();
    let mut batcher = NotificationBatcher::new(TerminalSink);
    let mut backoff = 1u64;

    loop {
        let connected_at = Instant::now();
        match run_session(
            &inbox_url,
            &mut device_token,
            &mut batcher,
            registry.as_ref(),
            uid.as_deref(),
        )
        .await
        {
            Ok(DisconnectReason::Shutdown) => return Ok(()),
            Ok(DisconnectReason::Error(e)) | Err(e) => {
                if connected_at.elapsed() >= Duration::from_secs(60) {
                    backoff = 1;
                }
                tracing::warn!("Inbox disconnected: {:#}. Reconnecting in {}s...", e, backoff);

                tokio::select! {
                    _ = time::sleep(Duration::from_secs(backoff)) => {}
                    _ = tokio::signal::ctrl_c() => {
                        println!("Shutting down...");
                        return Ok(());
                    }
                }
                backoff = (backoff * 2).min(64);
            }
        }
    }
}

/// One socket lifetime: receive frames until the connection drops or the
/// user interrupts.
async fn run_session(
    inbox_url: &str,
    device_token: &mut String,
    batcher: &mut NotificationBatcher<TerminalSink>,
    registry: Option<&DeviceTokenRegistry<StoreClient>>,
    uid: Option<&str>,
) -> Result<DisconnectReason> {
    let url = format!("{}?token={}", inbox_url, encode(device_token));
    let mut socket = WatchSocket::connect(&url).await?;

    println!("Inbox connected. Waiting for announcements... (Ctrl-C to stop)");

    loop {
        tokio::select! {
            frame = socket.recv_json() => {
                match frame {
                    Ok(Some(v)) => handle_frame(&v, device_token, batcher, registry, uid).await,
                    Ok(None) => {
                        return Ok(DisconnectReason::Error(anyhow::anyhow!(
                            "inbox socket closed by server"
                        )));
                    }
                    Err(e) => {
                        return Ok(DisconnectReason::Error(e.context("inbox receive error")));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                return Ok(DisconnectReason::Shutdown);
            }
        }
    }
}

async fn handle_frame(
    frame: &Value,
    device_token: &mut String,
    batcher: &mut NotificationBatcher<TerminalSink>,
    registry: Option<&DeviceTokenRegistry<StoreClient>>,
    uid: Option<&str>,
) {
    match frame.get("type").and_then(Value::as_str) {
        Some("push") => {
            let message = frame.get("message").cloned().unwrap_or(Value::Null);
            match PushPayload::from_value(&message) {
                Some(payload) => batcher.handle_push(payload),
                None => tracing::debug!("dropping unattributable push: {}", frame),
            }
        }
        Some("token") => {
            let Some(token) = frame.get("token").and_then(Value::as_str) else {
                tracing::debug!("rotation frame without token: {}", frame);
                return;
            };
            if token == device_token.as_str() {
                return;
            }
            *device_token = token.to_string();
            persist_device_token(device_token);

            if let Some(registry) = registry {
                registry.on_rotated(device_token.clone());
                let outcome = registry.sync_if_changed(uid).await;
                tracing::info!("device token sync after rotation: {:?}", outcome);
            }
        }
        _ => {
            tracing::debug!("Ignoring inbox frame: {}", frame);
        }
    }
}

/// Best effort: a rotation that cannot be persisted still takes effect
/// for this process.
fn persist_device_token(token: &str) {
    let result = Config::load().and_then(|mut config| {
        config.set_device_token(token.to_string());
        config.save()
    });
    if let Err(e) = result {
        tracing::warn!("Failed to persist rotated device token: {:#}", e);
    }
}
