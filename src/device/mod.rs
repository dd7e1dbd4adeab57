//! Device push-token registry
//!
//! Keeps the server-side copy of this installation's push token current.
//! Rotation callbacks arrive from the platform at any time, including
//! before the first sync has finished, and only record the new local
//! value; the next sync performs the conditional write.

use std::future::Future;
use std::sync::Mutex;

use crate::api::StoreError;

/// Remote side of the registry: the authenticated user's stored token.
pub trait TokenDirectory {
    fn stored_token(
        &self,
        uid: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;
    fn store_token(
        &self,
        uid: &str,
        token: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Result of one sync attempt. Failures are values, not panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local and stored token already match; nothing written.
    Unchanged,
    /// The stored token was replaced with the local one.
    Updated,
    Failed(SyncFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
    NotAuthenticated,
    Transport(String),
}

pub struct DeviceTokenRegistry<D> {
    directory: D,
    /// Current local token; rotations land here.
    local: Mutex<String>,
    /// Last value known to be stored remotely, so a redundant sync does
    /// not even read.
    synced: Mutex<Option<String>>,
}

impl<D: TokenDirectory> DeviceTokenRegistry<D> {
    pub fn new(directory: D, local_token: String) -> Self {
        Self {
            directory,
            local: Mutex::new(local_token),
            synced: Mutex::new(None),
        }
    }

    /// Record a rotated token. Safe to call at any time; the registry
    /// never writes from here.
    pub fn on_rotated(&self, token: String) {
        tracing::info!("push token rotated");
        *self.local.lock().unwrap() = token;
    }

    /// Write the local token to the store iff it differs from the stored
    /// one. At most one remote write per invocation; a repeat call with
    /// no rotation in between performs no remote operation at all.
    pub async fn sync_if_changed(&self, uid: Option<&str>) -> SyncOutcome {
        let Some(uid) = uid.filter(|u| !u.is_empty()) else {
            return SyncOutcome::Failed(SyncFailure::NotAuthenticated);
        };

        let local = self.local.lock().unwrap().clone();
        if local.is_empty() {
            return SyncOutcome::Unchanged;
        }
        if self.synced.lock().unwrap().as_deref() == Some(local.as_str()) {
            return SyncOutcome::Unchanged;
        }

        let stored = match self.directory.stored_token(uid).await {
            Ok(stored) => stored,
            Err(StoreError::NotAuthenticated) => {
                return SyncOutcome::Failed(SyncFailure::NotAuthenticated)
            }
            Err(e) => return SyncOutcome::Failed(SyncFailure::Transport(e.to_string())),
        };

        if stored.as_deref() == Some(local.as_str()) {
            *self.synced.lock().unwrap() = Some(local);
            return SyncOutcome::Unchanged;
        }

        match self.directory.store_token(uid, &local).await {
            Ok(()) => {
                *self.synced.lock().unwrap() = Some(local);
                SyncOutcome::Updated
            }
            Err(StoreError::NotAuthenticated) => {
                SyncOutcome::Failed(SyncFailure::NotAuthenticated)
            }
            Err(e) => SyncOutcome::Failed(SyncFailure::Transport(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct MockDirectory {
        stored: Arc<Mutex<Option<String>>>,
        reads: Arc<AtomicUsize>,
        writes: Arc<AtomicUsize>,
    }

    impl TokenDirectory for MockDirectory {
        async fn stored_token(&self, _uid: &str) -> Result<Option<String>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn store_token(&self, _uid: &str, token: &str) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().unwrap() = Some(token.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_sync_is_idempotent() {
        let dir = MockDirectory::default();
        let registry = DeviceTokenRegistry::new(dir.clone(), "tok-a".into());

        let first = tokio_test::block_on(registry.sync_if_changed(Some("u1")));
        assert_eq!(first, SyncOutcome::Updated);
        assert_eq!(dir.writes.load(Ordering::SeqCst), 1);

        // No rotation in between: the second call writes nothing.
        let second = tokio_test::block_on(registry.sync_if_changed(Some("u1")));
        assert_eq!(second, SyncOutcome::Unchanged);
        assert_eq!(dir.writes.load(Ordering::SeqCst), 1);
        assert_eq!(dir.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unchanged_when_store_already_matches() {
        let dir = MockDirectory::default();
        *dir.stored.lock().unwrap() = Some("tok-a".into());
        let registry = DeviceTokenRegistry::new(dir.clone(), "tok-a".into());

        let outcome = tokio_test::block_on(registry.sync_if_changed(Some("u1")));
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(dir.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_not_authenticated_is_a_value() {
        let dir = MockDirectory::default();
        let registry = DeviceTokenRegistry::new(dir.clone(), "tok-a".into());

        let outcome = tokio_test::block_on(registry.sync_if_changed(None));
        assert_eq!(outcome, SyncOutcome::Failed(SyncFailure::NotAuthenticated));
        assert_eq!(dir.reads.load(Ordering::SeqCst), 0);
        assert_eq!(dir.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rotation_before_first_sync() {
        let dir = MockDirectory::default();
        let registry = DeviceTokenRegistry::new(dir.clone(), "tok-a".into());

        registry.on_rotated("tok-b".into());
        let outcome = tokio_test::block_on(registry.sync_if_changed(Some("u1")));
        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(dir.stored.lock().unwrap().as_deref(), Some("tok-b"));
    }

    #[test]
    fn test_rotation_after_sync_triggers_one_more_write() {
        let dir = MockDirectory::default();
        let registry = DeviceTokenRegistry::new(dir.clone(), "tok-a".into());

        tokio_test::block_on(registry.sync_if_changed(Some("u1")));
        registry.on_rotated("tok-b".into());
        let outcome = tokio_test::block_on(registry.sync_if_changed(Some("u1")));

        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(dir.writes.load(Ordering::SeqCst), 2);
        assert_eq!(dir.stored.lock().unwrap().as_deref(), Some("tok-b"));
    }
}
