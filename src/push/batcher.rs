//! Per-organization notification batching on the receiving device
//!
//! Incoming pushes are grouped by organization name into a bounded recent
//! window, and each organization gets exactly one rendered notification
//! at a time: the identifier is derived from the name, so a later render
//! replaces the earlier one instead of stacking. State is process-
//! lifetime only; a restart starts empty.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::models::str_field;

/// Most recent bodies retained per organization.
pub const BATCH_CAPACITY: usize = 5;

/// A push as received by the device.
#[derive(Debug, Clone)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub org_id: String,
    pub org_name: String,
}

impl PushPayload {
    /// Parse the `message` object of an incoming push. Returns `None`
    /// when the organization name is missing; such a push cannot be
    /// attributed and is dropped.
    pub fn from_value(message: &Value) -> Option<Self> {
        let notification = message.get("notification").cloned().unwrap_or(Value::Null);
        let data = message.get("data").cloned().unwrap_or(Value::Null);

        let org_name = str_field(&data, "orgName");
        if org_name.is_empty() {
            return None;
        }

        Some(Self {
            title: str_field(&notification, "title"),
            body: str_field(&notification, "body"),
            org_id: str_field(&data, "orgId"),
            org_name,
        })
    }
}

/// One coalesced notification for one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    /// Derived from the organization name; stable across renders so the
    /// platform replaces rather than duplicates.
    pub id: u64,
    pub org_name: String,
    pub summary: String,
    /// Retained bodies, oldest first.
    pub lines: Vec<String>,
}

/// Where rendered notifications go. The terminal sink is the CLI's
/// stand-in for a platform notification tray.
pub trait NotificationSink {
    /// Called once per organization, the first time it is seen.
    fn create_channel(&mut self, org_name: &str);
    fn render(&mut self, notification: RenderedNotification);
}

/// Stable notification identifier for an organization name.
fn notification_id(org_name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    org_name.hash(&mut hasher);
    hasher.finish()
}

/// Groups pushes by organization and renders one notification per
/// organization over the retained window.
pub struct NotificationBatcher<S> {
    sink: S,
    recent: HashMap<String, VecDeque<String>>,
    channels: HashSet<String>,
}

impl<S: NotificationSink> NotificationBatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            recent: HashMap::new(),
            channels: HashSet::new(),
        }
    }

    /// Fold one push into the window and re-render that organization's
    /// notification. The window never exceeds `BATCH_CAPACITY`; the
    /// oldest entry is evicted first.
    pub fn handle_push(&mut self, push: PushPayload) {
        if push.org_name.is_empty() {
            tracing::debug!("dropping push without organization name");
            return;
        }
        tracing::debug!(
            "push for {} ({}): {}",
            push.org_name,
            push.org_id,
            push.title
        );

        if self.channels.insert(push.org_name.clone()) {
            self.sink.create_channel(&push.org_name);
        }

        let window = self.recent.entry(push.org_name.clone()).or_default();
        if window.len() == BATCH_CAPACITY {
            window.pop_front();
        }
        window.push_back(push.body);

        let lines: Vec<String> = window.iter().cloned().collect();
        self.sink.render(RenderedNotification {
            id: notification_id(&push.org_name),
            org_name: push.org_name.clone(),
            summary: format!("{} message(s)", lines.len()),
            lines,
        });
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Prints each organization's coalesced notification to the terminal.
#[derive(Debug, Default)]
pub struct TerminalSink;

impl NotificationSink for TerminalSink {
    fn create_channel(&mut self, org_name: &str) {
        tracing::debug!("notification channel created for {}", org_name);
    }

    fn render(&mut self, n: RenderedNotification) {
        tracing::debug!("rendering notification {:x} for {}", n.id, n.org_name);
        println!("\n-- {} ({}) --", n.org_name, n.summary);
        for line in &n.lines {
            println!("  {}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Keeps only the latest render per notification id, like a platform
    /// notification tray.
    #[derive(Default)]
    struct RecordingSink {
        channels: Vec<String>,
        live: HashMap<u64, RenderedNotification>,
        renders: usize,
    }

    impl NotificationSink for RecordingSink {
        fn create_channel(&mut self, org_name: &str) {
            self.channels.push(org_name.to_string());
        }

        fn render(&mut self, notification: RenderedNotification) {
            self.renders += 1;
            self.live.insert(notification.id, notification);
        }
    }

    fn push(org: &str, body: &str) -> PushPayload {
        PushPayload {
            title: org.to_string(),
            body: body.to_string(),
            org_id: "o1".into(),
            org_name: org.to_string(),
        }
    }

    #[test]
    fn test_seven_pushes_keep_last_five_in_order() {
        let mut batcher = NotificationBatcher::new(RecordingSink::default());
        for i in 1..=7 {
            batcher.handle_push(push("Acme", &format!("m{i}")));
        }

        let sink = batcher.sink();
        // One live notification for Acme, replaced on every push.
        assert_eq!(sink.live.len(), 1);
        assert_eq!(sink.renders, 7);

        let n = sink.live.values().next().unwrap();
        assert_eq!(n.summary, "5 message(s)");
        assert_eq!(n.lines, vec!["m3", "m4", "m5", "m6", "m7"]);
    }

    #[test]
    fn test_channel_created_once_per_org() {
        let mut batcher = NotificationBatcher::new(RecordingSink::default());
        batcher.handle_push(push("Acme", "a"));
        batcher.handle_push(push("Acme", "b"));
        batcher.handle_push(push("Globex", "c"));

        assert_eq!(batcher.sink().channels, vec!["Acme", "Globex"]);
        assert_eq!(batcher.sink().live.len(), 2);
    }

    #[test]
    fn test_orgs_batch_independently() {
        let mut batcher = NotificationBatcher::new(RecordingSink::default());
        for i in 0..BATCH_CAPACITY + 2 {
            batcher.handle_push(push("Acme", &format!("a{i}")));
        }
        batcher.handle_push(push("Globex", "g0"));

        let acme = batcher
            .sink()
            .live
            .values()
            .find(|n| n.org_name == "Acme")
            .unwrap();
        let globex = batcher
            .sink()
            .live
            .values()
            .find(|n| n.org_name == "Globex")
            .unwrap();
        assert_eq!(acme.lines.len(), BATCH_CAPACITY);
        assert_eq!(globex.lines, vec!["g0"]);
        assert_eq!(globex.summary, "1 message(s)");
    }

    #[test]
    fn test_unattributable_push_dropped() {
        let message = json!({
            "notification": {"title": "?", "body": "no org"},
            "data": {"orgId": "o1"}
        });
        assert!(PushPayload::from_value(&message).is_none());
    }

    #[test]
    fn test_payload_parse() {
        let message = json!({
            "notification": {"title": "Acme", "body": "Midterm Friday"},
            "data": {"orgId": "o1", "orgName": "Acme"}
        });
        let p = PushPayload::from_value(&message).unwrap();
        assert_eq!(p.body, "Midterm Friday");
        assert_eq!(p.org_name, "Acme");
    }

    #[test]
    fn test_notification_id_stable_per_name() {
        assert_eq!(notification_id("Acme"), notification_id("Acme"));
        assert_ne!(notification_id("Acme"), notification_id("Globex"));
    }
}
