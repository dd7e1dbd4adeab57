//! Live change subscriptions on store queries
//!
//! Each subscription is one WebSocket: the client sends a single subscribe
//! frame naming a query, and the server pushes a full current snapshot of
//! the matching records on every change. Consumers receive snapshots over
//! a channel; the transport reconnects with exponential backoff and
//! resubscribes, and a disconnect surfaces as one `Lost` event so the
//! consumer can publish empty rather than stale state.

pub mod socket;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use socket::WatchSocket;

/// The three query shapes the store can watch.
#[derive(Debug, Clone)]
pub enum WatchQuery {
    /// Organizations where `owner == uid`.
    OwnedOrganizations { uid: String },
    /// Organizations where `uid ∈ members`.
    MemberOrganizations { uid: String },
    /// The message log of a single organization.
    MessageLog { org_id: String },
}

impl WatchQuery {
    /// The subscribe frame sent once per connection.
    fn subscribe_frame(&self) -> Value {
        match self {
            WatchQuery::OwnedOrganizations { uid } => json!({
                "watch": { "collection": "organizations", "filter": { "owner": uid } }
            }),
            WatchQuery::MemberOrganizations { uid } => json!({
                "watch": { "collection": "organizations", "filter": { "member": uid } }
            }),
            WatchQuery::MessageLog { org_id } => json!({
                "watch": { "collection": "messages", "orgId": org_id }
            }),
        }
    }
}

/// One delivery from a subscription.
#[derive(Debug)]
pub enum WatchEvent {
    /// Full current result set, superseding any previous snapshot.
    Snapshot(Vec<Value>),
    /// Transport lost; the consumer should publish empty state. A fresh
    /// snapshot follows once the transport reconnects.
    Lost,
}

/// A cancellable change subscription.
///
/// Cancellation is the shared alive flag plus an abort of the transport
/// task: flipping the flag is effective immediately for future events,
/// and an event already in flight checks it before touching shared
/// state.
pub struct Subscription {
    events: mpsc::Receiver<WatchEvent>,
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Open a subscription. The task owns the socket and feeds the event
    /// channel until unsubscribed.
    pub fn subscribe(watch_url: String, token: String, query: WatchQuery) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(8);

        let flag = alive.clone();
        let task = tokio::spawn(async move {
            run_subscription(watch_url, token, query, flag, tx).await;
        });

        Self {
            events: rx,
            alive,
            task,
        }
    }

    /// Split into the event channel, the alive flag and the transport
    /// task, for consumers that drive the events from their own task and
    /// own the teardown.
    pub fn into_parts(self) -> (mpsc::Receiver<WatchEvent>, Arc<AtomicBool>, JoinHandle<()>) {
        (self.events, self.alive, self.task)
    }
}

/// Transport loop: connect, subscribe, forward snapshots; reconnect with
/// exponential backoff (1s doubling to 64s, reset after a stable minute).
async fn run_subscription(
    watch_url: String,
    token: String,
    query: WatchQuery,
    alive: Arc<AtomicBool>,
    tx: mpsc::Sender<WatchEvent>,
) {
    let mut backoff = 1u64;

    loop {
        if !alive.load(Ordering::SeqCst) {
            return;
        }

        let connected_at = Instant::now();
        match run_connection(&watch_url, &token, &query, &alive, &tx).await {
            Ok(()) => return, // channel closed or unsubscribed
            Err(e) => {
                if !alive.load(Ordering::SeqCst) {
                    return;
                }
                tracing::warn!("watch stream lost ({:?}): {:#}", query, e);
                if tx.send(WatchEvent::Lost).await.is_err() {
                    return;
                }
            }
        }

        if connected_at.elapsed() >= Duration::from_secs(60) {
            backoff = 1;
        }
        time::sleep(Duration::from_secs(backoff)).await;
        backoff = (backoff * 2).min(64);
    }
}

/// One connection lifetime: subscribe, then forward snapshots until the
/// socket drops. `Ok` means the consumer went away and the loop should
/// end; `Err` means reconnect.
async fn run_connection(
    watch_url: &str,
    token: &str,
    query: &WatchQuery,
    alive: &AtomicBool,
    tx: &mpsc::Sender<WatchEvent>,
) -> anyhow::Result<()> {
    let url = format!("{}?access_token={}", watch_url, crate::api::client::encode(token));
    let mut socket = WatchSocket::connect(&url).await?;
    socket.send_json(&query.subscribe_frame()).await?;

    loop {
        let frame = socket
            .recv_json()
            .await?
            .ok_or_else(|| anyhow::anyhow!("watch socket closed by server"))?;

        if !alive.load(Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(snapshot) = frame.get("snapshot") {
            let docs = snapshot
                .get("documents")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if tx.send(WatchEvent::Snapshot(docs)).await.is_err() {
                return Ok(());
            }
        } else {
            tracing::debug!("Ignoring non-snapshot watch frame: {}", frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_frames_name_the_query() {
        let owned = WatchQuery::OwnedOrganizations { uid: "u1".into() }.subscribe_frame();
        assert_eq!(owned["watch"]["filter"]["owner"], "u1");

        let member = WatchQuery::MemberOrganizations { uid: "u2".into() }.subscribe_frame();
        assert_eq!(member["watch"]["filter"]["member"], "u2");

        let log = WatchQuery::MessageLog { org_id: "o1".into() }.subscribe_frame();
        assert_eq!(log["watch"]["collection"], "messages");
        assert_eq!(log["watch"]["orgId"], "o1");
    }
}
