//! The Address-of-Record document model
//!
//! An AoR is the unit of subscriber state held in the store: the set of
//! contact bindings registered for a subscriber, the reg-event
//! subscriptions watching it, the implicit registration set it belongs
//! to, and the NOTIFY sequencing counter. The document is keyed in the
//! store by the canonical default public identity; the store version
//! travels beside the document, never inside it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod patch;

pub use patch::PatchObject;

// ============ Associated URIs ============

/// One public identity in an implicit registration set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociatedUri {
    /// The public identity (e.g. "sip:alice@example.com")
    pub uri: String,

    /// Whether this identity is barred from use
    pub barred: bool,
}

/// The ordered set of public identities registered together
///
/// The first non-barred entry is the default identity for the set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociatedUris {
    uris: Vec<AssociatedUri>,
}

impl AssociatedUris {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a URI to the set, preserving order.
    pub fn add_uri(&mut self, uri: impl Into<String>, barred: bool) {
        self.uris.push(AssociatedUri {
            uri: uri.into(),
            barred,
        });
    }

    /// The default public identity: the first entry, skipping barred
    /// identities unless `include_barred` is set.
    pub fn default_impu(&self, include_barred: bool) -> Option<&str> {
        self.uris
            .iter()
            .find(|u| include_barred || !u.barred)
            .map(|u| u.uri.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssociatedUri> {
        self.uris.iter()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.uris.iter().any(|u| u.uri == uri)
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

// ============ Bindings ============

/// A contact binding registered by a SIP UA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// The AoR this binding was registered against
    pub address_of_record: String,

    /// The contact URI the UA can be reached at
    pub uri: String,

    /// Call-ID of the REGISTER dialog that created this binding
    pub call_id: String,

    /// CSeq of the last REGISTER that touched this binding
    pub cseq: u32,

    /// Absolute expiry time, epoch seconds
    pub expires: i64,

    /// Relative priority of this binding (RFC 3261 q-value)
    pub q: Option<f32>,

    /// Path headers learnt from the REGISTER (RFC 3327)
    pub path_headers: Vec<String>,

    /// Private identity that authenticated the REGISTER
    pub private_id: Option<String>,

    /// Whether this is an emergency registration
    pub emergency: bool,

    /// Identity of the expiry timer set for this binding
    pub timer_id: Option<String>,
}

impl Binding {
    /// A binding whose expiry has been reached is treated as removed.
    pub fn expired(&self, now: i64) -> bool {
        self.expires <= now
    }
}

// ============ Subscriptions ============

/// A watcher's reg-event subscription, with enough dialog state to
/// construct in-dialog NOTIFYs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// The watcher's contact URI, used as the NOTIFY request URI
    pub req_uri: String,

    /// From URI of the original SUBSCRIBE
    pub from_uri: String,

    /// From tag of the original SUBSCRIBE
    pub from_tag: String,

    /// To URI of the original SUBSCRIBE
    pub to_uri: String,

    /// To tag assigned when the subscription dialog was created
    pub to_tag: String,

    /// Call-ID of the subscription dialog
    pub call_id: String,

    /// Route set recorded from the SUBSCRIBE
    pub routes: Vec<String>,

    /// Absolute expiry time, epoch seconds
    pub expires: i64,

    /// CSeq of the last NOTIFY sent on this dialog
    pub last_notify_cseq: u32,
}

impl Subscription {
    pub fn expired(&self, now: i64) -> bool {
        self.expires <= now
    }
}

/// Bindings keyed by binding ID (typically `<instance URN>:<reg-id>`)
pub type Bindings = BTreeMap<String, Binding>;

/// Subscriptions keyed by subscription ID (typically `<to-tag>:<from-tag>`)
pub type Subscriptions = BTreeMap<String, Subscription>;

// ============ The AoR document ============

/// The stored per-subscriber document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AoR {
    /// Active contact bindings
    pub bindings: Bindings,

    /// Active reg-event subscriptions
    pub subscriptions: Subscriptions,

    /// The implicit registration set this AoR belongs to
    pub associated_uris: AssociatedUris,

    /// Sequencing counter for reg-event state; bumped once per
    /// watcher-visible mutation
    pub notify_cseq: u32,

    /// The S-CSCF this AoR was registered under
    pub scscf_uri: String,
}

impl AoR {
    pub fn new(scscf_uri: impl Into<String>) -> Self {
        Self {
            scscf_uri: scscf_uri.into(),
            ..Default::default()
        }
    }

    /// Bindings that have not yet expired.
    pub fn active_bindings(&self, now: i64) -> Bindings {
        self.bindings
            .iter()
            .filter(|(_, b)| !b.expired(now))
            .map(|(id, b)| (id.clone(), b.clone()))
            .collect()
    }

    /// Subscriptions that have not yet expired.
    pub fn active_subscriptions(&self, now: i64) -> Subscriptions {
        self.subscriptions
            .iter()
            .filter(|(_, s)| !s.expired(now))
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect()
    }

    pub fn has_active_bindings(&self, now: i64) -> bool {
        self.bindings.values().any(|b| !b.expired(now))
    }

    /// Drop lapsed bindings, then any subscription that has lapsed or
    /// whose parent contact no longer exists with the same URI. Applied
    /// by the store on every committed write, so a committed document
    /// never carries dead entries.
    pub fn purge_expired(&mut self, now: i64) {
        self.bindings.retain(|_, b| !b.expired(now));
        let contact_uris: Vec<String> =
            self.bindings.values().map(|b| b.uri.clone()).collect();
        self.subscriptions
            .retain(|_, s| !s.expired(now) && contact_uris.iter().any(|u| u == &s.req_uri));
    }
}
