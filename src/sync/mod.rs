//! Organization sync engine
//!
//! Converts store change streams into consistent in-memory projections.
//! Three subscriptions are active per session: owned organizations,
//! member-of organizations, and the message log of one externally
//! selected organization. Each projection is published on a
//! `tokio::sync::watch` channel; writers replace the whole value, so
//! readers only ever observe a fully-formed snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use crate::config::Config;
use crate::models::{decode_messages, decode_organizations, Message, Organization};
use crate::watch::{Subscription, WatchEvent, WatchQuery};

/// Map an organization snapshot into its projection: deduplicated by id,
/// ordered by name.
pub fn project_organizations(docs: &[Value]) -> Vec<Organization> {
    let mut orgs = decode_organizations(docs);
    let mut seen = std::collections::HashSet::new();
    orgs.retain(|o| o.id.is_empty() || seen.insert(o.id.clone()));
    orgs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    orgs
}

/// Map a message-log snapshot into its projection: ordered by timestamp
/// (stable, so per-sender order is preserved among ties), exact duplicates
/// collapsed.
pub fn project_messages(docs: &[Value]) -> Vec<Message> {
    let mut msgs = decode_messages(docs);
    msgs.sort_by_key(|m| m.timestamp);
    msgs.dedup();
    msgs
}

/// Consumer side of one subscription: applies each event to the published
/// projection, checking the still-subscribed flag first so an event in
/// flight at teardown time is a no-op. `Lost` and empty snapshots publish
/// empty, never stale.
pub(crate) async fn drive_projection<T, F>(
    mut events: mpsc::Receiver<WatchEvent>,
    alive: Arc<AtomicBool>,
    tx: Arc<watch::Sender<Vec<T>>>,
    map: F,
) where
    T: Send + Sync + 'static,
    F: Fn(&[Value]) -> Vec<T> + Send + 'static,
{
    while let Some(event) = events.recv().await {
        if !alive.load(Ordering::SeqCst) {
            break;
        }
        let next = match event {
            WatchEvent::Snapshot(docs) => map(&docs),
            WatchEvent::Lost => Vec::new(),
        };
        tx.send_replace(next);
    }
}

/// One live subscription plus its projection driver.
struct ProjectionTask {
    alive: Arc<AtomicBool>,
    transport: JoinHandle<()>,
    driver: JoinHandle<()>,
}

impl ProjectionTask {
    fn spawn<T, F>(sub: Subscription, tx: Arc<watch::Sender<Vec<T>>>, map: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&[Value]) -> Vec<T> + Send + 'static,
    {
        let (events, alive, transport) = sub.into_parts();
        let driver = tokio::spawn(drive_projection(events, alive.clone(), tx, map));
        Self {
            alive,
            transport,
            driver,
        }
    }

    /// Stop both halves. Future events cannot touch the projection; the
    /// flag covers anything already queued.
    fn teardown(self) {
        self.alive.store(false, Ordering::SeqCst);
        self.transport.abort();
        self.driver.abort();
    }
}

/// The per-session sync engine. Single writer per projection; any number
/// of readers.
pub struct SyncEngine {
    watch_url: String,
    token: String,
    owned_rx: watch::Receiver<Vec<Organization>>,
    joined_rx: watch::Receiver<Vec<Organization>>,
    log_rx: watch::Receiver<Vec<Message>>,
    log_tx: Arc<watch::Sender<Vec<Message>>>,
    owned: ProjectionTask,
    joined: ProjectionTask,
    log: Option<ProjectionTask>,
}

impl SyncEngine {
    /// Start the owned and member-of subscriptions. No message log is
    /// watched until `select_org`.
    pub fn start(watch_url: &str, token: &str, uid: &str) -> Self {
        let (owned_tx, owned_rx) = watch::channel(Vec::new());
        let (joined_tx, joined_rx) = watch::channel(Vec::new());
        let (log_tx, log_rx) = watch::channel(Vec::new());

        let owned = ProjectionTask::spawn(
            Subscription::subscribe(
                watch_url.to_string(),
                token.to_string(),
                WatchQuery::OwnedOrganizations { uid: uid.to_string() },
            ),
            Arc::new(owned_tx),
            project_organizations,
        );
        let joined = ProjectionTask::spawn(
            Subscription::subscribe(
                watch_url.to_string(),
                token.to_string(),
                WatchQuery::MemberOrganizations { uid: uid.to_string() },
            ),
            Arc::new(joined_tx),
            project_organizations,
        );

        Self {
            watch_url: watch_url.to_string(),
            token: token.to_string(),
            owned_rx,
            joined_rx,
            log_rx,
            log_tx: Arc::new(log_tx),
            owned,
            joined,
            log: None,
        }
    }

    pub fn owned(&self) -> watch::Receiver<Vec<Organization>> {
        self.owned_rx.clone()
    }

    pub fn joined(&self) -> watch::Receiver<Vec<Organization>> {
        self.joined_rx.clone()
    }

    pub fn messages(&self) -> watch::Receiver<Vec<Message>> {
        self.log_rx.clone()
    }

    /// Switch the message-log subscription to another organization (or
    /// none). The previous subscription is torn down first and the
    /// projection cleared, so consumers never see the old log under the
    /// new selection.
    pub fn select_org(&mut self, org_id: Option<&str>) {
        if let Some(prev) = self.log.take() {
            prev.teardown();
        }
        self.log_tx.send_replace(Vec::new());

        let org_id = match org_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => return,
        };

        self.log = Some(ProjectionTask::spawn(
            Subscription::subscribe(
                self.watch_url.clone(),
                self.token.clone(),
                WatchQuery::MessageLog { org_id },
            ),
            self.log_tx.clone(),
            project_messages,
        ));
    }

    /// Tear down every subscription.
    pub fn shutdown(mut self) {
        if let Some(log) = self.log.take() {
            log.teardown();
        }
        self.owned.teardown();
        self.joined.teardown();
    }
}

/// Run the `watch` command: start the engine and print each projection as
/// it changes, until Ctrl-C.
pub async fn run_watch(org_id: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let token = match config.get_session_token() {
        Some(t) if !t.is_expired() => t.token,
        _ => anyhow::bail!("Not authenticated. Run `herald-cli login` first."),
    };
    let uid = config
        .uid()
        .ok_or_else(|| anyhow::anyhow!("No user id stored. Run `herald-cli login` first."))?;

    let mut engine = SyncEngine::start(&config.watch_url(), &token, &uid);
    engine.select_org(org_id.as_deref());

    let mut owned = WatchStream::new(engine.owned());
    let mut joined = WatchStream::new(engine.joined());
    let mut messages = WatchStream::new(engine.messages());

    println!("Watching for changes... (Ctrl-C to stop)");

    loop {
        tokio::select! {
            Some(orgs) = owned.next() => print_orgs("owned", &orgs),
            Some(orgs) = joined.next() => print_orgs("joined", &orgs),
            Some(msgs) = messages.next() => print_messages(&msgs),
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    engine.shutdown();
    Ok(())
}

fn print_orgs(label: &str, orgs: &[Organization]) {
    println!("[{}] {} organization(s)", label, orgs.len());
    for org in orgs {
        println!("  {}  ({} members)  {}", org.name, org.members.len(), org.id);
    }
}

fn print_messages(msgs: &[Message]) {
    println!("[log] {} message(s)", msgs.len());
    for msg in msgs {
        let when = chrono::DateTime::from_timestamp_millis(msg.timestamp)
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_default();
        println!("  [{}] {}: {}", when, msg.sender, msg.content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_organizations_dedup_and_order() {
        let docs = vec![
            json!({"id": "o2", "name": "Globex", "owner": "u1"}),
            json!({"id": "o1", "name": "Acme", "owner": "u1"}),
            json!({"id": "o2", "name": "Globex dup", "owner": "u1"}),
        ];
        let orgs = project_organizations(&docs);
        assert_eq!(orgs.len(), 2);
        assert_eq!(orgs[0].name, "Acme");
        assert_eq!(orgs[1].name, "Globex");
    }

    #[test]
    fn test_project_messages_ordered_stable() {
        let docs = vec![
            json!({"content": "b", "senderId": "u2", "timestamp": 200}),
            json!({"content": "a1", "senderId": "u1", "timestamp": 100}),
            json!({"content": "a2", "senderId": "u1", "timestamp": 100}),
            json!({"content": "b", "senderId": "u2", "timestamp": 200}),
        ];
        let msgs = project_messages(&docs);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].content, "a1");
        assert_eq!(msgs[1].content, "a2");
        assert_eq!(msgs[2].content, "b");
    }

    #[tokio::test]
    async fn test_projection_replaced_atomically() {
        let (etx, erx) = mpsc::channel(4);
        let alive = Arc::new(AtomicBool::new(true));
        let (tx, rx) = watch::channel(Vec::new());
        let task = tokio::spawn(drive_projection(
            erx,
            alive.clone(),
            Arc::new(tx),
            project_organizations,
        ));

        etx.send(WatchEvent::Snapshot(vec![
            json!({"id": "o1", "name": "Acme", "owner": "u1"}),
        ]))
        .await
        .unwrap();

        let mut rx = rx;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);

        // Transport loss publishes empty, not stale.
        etx.send(WatchEvent::Lost).await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_empty());

        drop(etx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_torn_down_subscription_stops_influencing_projection() {
        let (etx, erx) = mpsc::channel(4);
        let alive = Arc::new(AtomicBool::new(true));
        let (tx, rx) = watch::channel(Vec::new());
        let task = tokio::spawn(drive_projection(
            erx,
            alive.clone(),
            Arc::new(tx),
            project_organizations,
        ));

        etx.send(WatchEvent::Snapshot(vec![
            json!({"id": "o1", "name": "Acme", "owner": "u1"}),
        ]))
        .await
        .unwrap();
        let mut rx = rx;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);

        // Teardown, then a late change event: projection must not move.
        alive.store(false, Ordering::SeqCst);
        etx.send(WatchEvent::Snapshot(vec![
            json!({"id": "o9", "name": "Late", "owner": "u1"}),
        ]))
        .await
        .unwrap();
        task.await.unwrap();

        assert_eq!(rx.borrow().len(), 1);
        assert_eq!(rx.borrow()[0].name, "Acme");
    }
}
