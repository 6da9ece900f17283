//! In-memory store implementation
//!
//! Documents are held as serialised JSON beside a monotonically
//! increasing version, which keeps the backend honest about what a
//! remote store would see. Expiry is announced over an mpsc handle
//! supplied at construction; the embedder feeds the published AoR IDs
//! back into the subscriber manager, so there is no reference cycle
//! between store and manager.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{AorStore, StoreError, Version};
use crate::aor::{AoR, PatchObject};

struct StoredAor {
    data: String,
    version: Version,
}

/// DashMap-backed versioned AoR store
pub struct MemoryAorStore {
    docs: DashMap<String, StoredAor>,
    expiry_tx: Option<mpsc::Sender<String>>,
}

impl MemoryAorStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            expiry_tx: None,
        }
    }

    /// Create a store that publishes the IDs of AoRs holding lapsed
    /// entries on the given channel whenever a sweep runs.
    pub fn with_expiry_handle(expiry_tx: mpsc::Sender<String>) -> Self {
        Self {
            docs: DashMap::new(),
            expiry_tx: Some(expiry_tx),
        }
    }

    fn decode(&self, data: &str) -> Result<AoR, StoreError> {
        serde_json::from_str(data).map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn encode(&self, aor: &AoR) -> Result<String, StoreError> {
        serde_json::to_string(aor).map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Find AoRs with lapsed bindings or subscriptions and publish
    /// their IDs to the expiry handle. Returns the IDs found. The sweep
    /// itself mutates nothing; the manager performs the removal so the
    /// resulting NOTIFYs and accounting are not skipped.
    pub async fn sweep_expired(&self, now: i64) -> Vec<String> {
        let mut lapsed = Vec::new();
        for entry in self.docs.iter() {
            match self.decode(&entry.value().data) {
                Ok(aor) => {
                    let has_lapsed = aor.bindings.values().any(|b| b.expired(now))
                        || aor.subscriptions.values().any(|s| s.expired(now));
                    if has_lapsed {
                        lapsed.push(entry.key().clone());
                    }
                }
                Err(e) => warn!("Skipping undecodable document {}: {}", entry.key(), e),
            }
        }

        if let Some(tx) = &self.expiry_tx {
            for aor_id in &lapsed {
                if tx.send(aor_id.clone()).await.is_err() {
                    debug!("Expiry handle closed, dropping event for {}", aor_id);
                }
            }
        }
        lapsed
    }

    /// Spawn a background task sweeping for lapsed entries on a fixed
    /// interval.
    pub fn spawn_sweeper(self: &Arc<Self>, interval_secs: u64) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                store.sweep_expired(Utc::now().timestamp()).await;
            }
        })
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl Default for MemoryAorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AorStore for MemoryAorStore {
    async fn get(&self, aor_id: &str) -> Result<(AoR, Version), StoreError> {
        let entry = self.docs.get(aor_id).ok_or(StoreError::NotFound)?;
        let aor = self.decode(&entry.data)?;
        Ok((aor, entry.version))
    }

    async fn put(&self, aor_id: &str, aor: &AoR) -> Result<Version, StoreError> {
        let mut doc = aor.clone();
        doc.purge_expired(Utc::now().timestamp());
        let data = self.encode(&doc)?;

        match self.docs.entry(aor_id.to_string()) {
            Entry::Occupied(mut e) => {
                let stored = e.get_mut();
                stored.version += 1;
                stored.data = data;
                Ok(stored.version)
            }
            Entry::Vacant(v) => {
                v.insert(StoredAor { data, version: 1 });
                Ok(1)
            }
        }
    }

    async fn patch(
        &self,
        aor_id: &str,
        patch: &PatchObject,
        version: Version,
    ) -> Result<(AoR, Version), StoreError> {
        let now = Utc::now().timestamp();
        match self.docs.entry(aor_id.to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().version != version {
                    return Err(StoreError::Conflict);
                }
                let mut aor = self.decode(&e.get().data)?;
                patch.apply(&mut aor, now);
                let new_version = version + 1;
                if aor.bindings.is_empty() {
                    // An AoR without bindings does not linger as an
                    // empty document.
                    e.remove();
                    debug!("Removed emptied document {}", aor_id);
                } else {
                    let data = self.encode(&aor)?;
                    let stored = e.get_mut();
                    stored.version = new_version;
                    stored.data = data;
                }
                Ok((aor, new_version))
            }
            Entry::Vacant(_) => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, aor_id: &str, version: Version) -> Result<(), StoreError> {
        match self.docs.entry(aor_id.to_string()) {
            Entry::Occupied(e) => {
                if e.get().version != version {
                    return Err(StoreError::Conflict);
                }
                e.remove();
                Ok(())
            }
            Entry::Vacant(_) => Err(StoreError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aor::Binding;

    fn aor_with_binding(expires: i64) -> AoR {
        let mut aor = AoR::new("sip:scscf.example.com");
        aor.associated_uris.add_uri("sip:alice@example.com", false);
        aor.notify_cseq = 1;
        aor.bindings.insert(
            "b1".to_string(),
            Binding {
                address_of_record: "sip:alice@example.com".to_string(),
                uri: "sip:a@1.2.3.4".to_string(),
                call_id: "cid".to_string(),
                cseq: 1,
                expires,
                q: None,
                path_headers: vec![],
                private_id: None,
                emergency: false,
                timer_id: None,
            },
        );
        aor
    }

    fn far_future() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryAorStore::new();
        let aor = aor_with_binding(far_future());

        let version = store.put("sip:alice@example.com", &aor).await.unwrap();
        assert_eq!(version, 1);

        let (read, read_version) = store.get("sip:alice@example.com").await.unwrap();
        assert_eq!(read, aor);
        assert_eq!(read_version, 1);
    }

    #[tokio::test]
    async fn test_patch_rejects_stale_version() {
        let store = MemoryAorStore::new();
        let aor = aor_with_binding(far_future());
        let version = store.put("sip:alice@example.com", &aor).await.unwrap();

        let patch = PatchObject::new().increment_cseq();
        let (_, v2) = store
            .patch("sip:alice@example.com", &patch, version)
            .await
            .unwrap();
        assert_eq!(v2, 2);

        // Replay against the superseded version.
        let err = store
            .patch("sip:alice@example.com", &patch, version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn test_emptied_document_is_removed() {
        let store = MemoryAorStore::new();
        let aor = aor_with_binding(far_future());
        let version = store.put("sip:alice@example.com", &aor).await.unwrap();

        let patch = PatchObject::new()
            .remove_bindings(vec!["b1".to_string()])
            .increment_cseq();
        let (post, _) = store
            .patch("sip:alice@example.com", &patch, version)
            .await
            .unwrap();
        assert!(post.bindings.is_empty());

        let err = store.get("sip:alice@example.com").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_requires_matching_version() {
        let store = MemoryAorStore::new();
        let aor = aor_with_binding(far_future());
        let version = store.put("sip:alice@example.com", &aor).await.unwrap();

        let err = store
            .delete("sip:alice@example.com", version + 7)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        store.delete("sip:alice@example.com", version).await.unwrap();
        assert!(matches!(
            store.delete("sip:alice@example.com", version).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_sweep_publishes_lapsed_aors() {
        let (tx, mut rx) = mpsc::channel(8);
        let store = MemoryAorStore::with_expiry_handle(tx);

        let now = Utc::now().timestamp();
        let fresh = aor_with_binding(now + 3600);
        let stale = aor_with_binding(now + 3600);
        store.put("sip:fresh@example.com", &fresh).await.unwrap();
        store.put("sip:stale@example.com", &stale).await.unwrap();

        let lapsed = store.sweep_expired(now).await;
        assert!(lapsed.is_empty());

        // An hour from now both documents hold lapsed bindings.

        let swept = store.sweep_expired(now + 7200).await;
        assert_eq!(swept.len(), 2);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
    }
}
