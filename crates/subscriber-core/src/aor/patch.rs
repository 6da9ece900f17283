//! Typed mutation documents applied to stored AoRs
//!
//! A patch carries exactly the dimensions being changed. An empty update
//! set or remove list means "no change to that dimension"; an absent
//! associated-URIs field leaves the registration set alone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AoR, AssociatedUris, Binding, Bindings, Subscription, Subscriptions};

/// A partial update to an AoR document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchObject {
    /// Bindings to insert or replace
    pub update_bindings: Bindings,

    /// Binding IDs to remove
    pub remove_bindings: Vec<String>,

    /// Subscriptions to insert or replace
    pub update_subscriptions: Subscriptions,

    /// Subscription IDs to remove
    pub remove_subscriptions: Vec<String>,

    /// Replacement registration set, if it is being changed
    pub associated_uris: Option<AssociatedUris>,

    /// NOTIFY CSeq bookkeeping for subscriptions that were just
    /// notified; never moves a counter backwards
    pub notify_cseq_updates: BTreeMap<String, u32>,

    /// Whether this mutation is visible to watchers and so bumps the
    /// AoR-level notify CSeq
    pub increment_cseq: bool,
}

impl PatchObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_binding(mut self, id: impl Into<String>, binding: Binding) -> Self {
        self.update_bindings.insert(id.into(), binding);
        self
    }

    pub fn update_bindings(mut self, bindings: Bindings) -> Self {
        self.update_bindings.extend(bindings);
        self
    }

    pub fn remove_bindings(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.remove_bindings.extend(ids);
        self
    }

    pub fn update_subscription(
        mut self,
        id: impl Into<String>,
        subscription: Subscription,
    ) -> Self {
        self.update_subscriptions.insert(id.into(), subscription);
        self
    }

    pub fn remove_subscriptions(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.remove_subscriptions.extend(ids);
        self
    }

    pub fn associated_uris(mut self, uris: AssociatedUris) -> Self {
        self.associated_uris = Some(uris);
        self
    }

    pub fn record_notify_cseq(mut self, id: impl Into<String>, cseq: u32) -> Self {
        self.notify_cseq_updates.insert(id.into(), cseq);
        self
    }

    pub fn increment_cseq(mut self) -> Self {
        self.increment_cseq = true;
        self
    }

    /// Whether the patch changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.update_bindings.is_empty()
            && self.remove_bindings.is_empty()
            && self.update_subscriptions.is_empty()
            && self.remove_subscriptions.is_empty()
            && self.associated_uris.is_none()
            && self.notify_cseq_updates.is_empty()
            && !self.increment_cseq
    }

    /// Apply this patch to a document. Removals win over concurrent
    /// updates in the same patch; lapsed entries are purged from the
    /// post-image; the CSeq bump happens exactly once, last.
    pub fn apply(&self, aor: &mut AoR, now: i64) {
        for (id, binding) in &self.update_bindings {
            aor.bindings.insert(id.clone(), binding.clone());
        }
        for id in &self.remove_bindings {
            aor.bindings.remove(id);
        }
        for (id, subscription) in &self.update_subscriptions {
            aor.subscriptions.insert(id.clone(), subscription.clone());
        }
        for id in &self.remove_subscriptions {
            aor.subscriptions.remove(id);
        }
        for (id, cseq) in &self.notify_cseq_updates {
            if let Some(s) = aor.subscriptions.get_mut(id) {
                if *cseq > s.last_notify_cseq {
                    s.last_notify_cseq = *cseq;
                }
            }
        }
        if let Some(uris) = &self.associated_uris {
            aor.associated_uris = uris.clone();
        }
        aor.purge_expired(now);
        if self.increment_cseq {
            aor.notify_cseq += 1;
        }
    }
}
