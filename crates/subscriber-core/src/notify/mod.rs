//! NOTIFY construction for reg-event watchers
//!
//! Consumes the classified view of a committed mutation and produces
//! one NOTIFY per watcher that is owed one. The sender builds plain
//! request descriptors; shipping them is behind [`NotifyDispatcher`],
//! so the core never touches the SIP transport itself and a refused
//! NOTIFY never unwinds a committed store change.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::aor::AssociatedUris;
use crate::classify::{
    ClassifiedBinding, ClassifiedSubscription, TerminationReason,
};

pub mod reginfo;

/// Event package carried on every NOTIFY
pub const EVENT_REG: &str = "reg";

/// Content type of the reginfo body
pub const CONTENT_TYPE_REGINFO: &str = "application/reginfo+xml";

/// A fully specified in-dialog NOTIFY, ready for the SIP stack
///
/// From and To are the SUBSCRIBE dialog seen from the notifier's side:
/// the watched identity (with the local To-tag) is the sender, the
/// watcher (with its From-tag) is the recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyRequest {
    pub subscription_id: String,
    pub request_uri: String,
    pub routes: Vec<String>,
    pub from_uri: String,
    pub from_tag: String,
    pub to_uri: String,
    pub to_tag: String,
    pub call_id: String,
    pub cseq: u32,
    pub branch: String,
    pub event: String,
    pub subscription_state: String,
    pub content_type: String,
    pub body: String,
}

/// Errors surfaced by a NOTIFY dispatcher
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The SIP stack refused to build or queue the request
    #[error("failed to queue NOTIFY: {0}")]
    Rejected(String),
}

/// Hand-off point to the SIP stack
#[async_trait]
pub trait NotifyDispatcher: Send + Sync {
    async fn dispatch(&self, notify: &NotifyRequest) -> Result<(), NotifyError>;
}

/// Builds and dispatches NOTIFYs for classified state changes
pub struct NotifySender {
    dispatcher: Arc<dyn NotifyDispatcher>,
}

impl NotifySender {
    pub fn new(dispatcher: Arc<dyn NotifyDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Send one NOTIFY to every watcher owed one.
    ///
    /// `cseq` is the reg-event version in effect after the mutation.
    /// Returns the per-subscription NOTIFY CSeqs consumed by watchers
    /// that survive the mutation, so the caller can record them.
    pub async fn send_notifys(
        &self,
        aor_id: &str,
        classified_bindings: &[ClassifiedBinding<'_>],
        classified_subscriptions: &[ClassifiedSubscription<'_>],
        associated_uris: &AssociatedUris,
        cseq: u32,
        now: i64,
    ) -> Vec<(String, u32)> {
        let registration_active = classified_bindings
            .iter()
            .any(|cb| !cb.event.is_terminal());

        // The body reports full state, so it is identical for every
        // watcher of this AoR.
        let body = match reginfo::build_reginfo(
            associated_uris,
            classified_bindings,
            registration_active,
            cseq,
        ) {
            Ok(body) => body,
            Err(e) => {
                warn!("Could not build reginfo body for {}: {}", aor_id, e);
                return Vec::new();
            }
        };

        let mut sent_cseqs = Vec::new();
        for cs in classified_subscriptions {
            if !cs.notify_required {
                continue;
            }
            debug!(
                "NOTIFY {} on subscription {} ({})",
                aor_id, cs.id, cs.reasons
            );

            let notify_cseq = cs.subscription.last_notify_cseq + 1;
            let notify = NotifyRequest {
                subscription_id: cs.id.to_string(),
                request_uri: cs.subscription.req_uri.clone(),
                routes: cs.subscription.routes.clone(),
                from_uri: cs.subscription.to_uri.clone(),
                from_tag: cs.subscription.to_tag.clone(),
                to_uri: cs.subscription.from_uri.clone(),
                to_tag: cs.subscription.from_tag.clone(),
                call_id: cs.subscription.call_id.clone(),
                cseq: notify_cseq,
                branch: format!("z9hG4bK{:08x}", rand::random::<u32>()),
                event: EVENT_REG.to_string(),
                subscription_state: subscription_state_header(cs, now),
                content_type: CONTENT_TYPE_REGINFO.to_string(),
                body: body.clone(),
            };

            match self.dispatcher.dispatch(&notify).await {
                Ok(()) => {
                    if !cs.event.is_terminal() {
                        sent_cseqs.push((cs.id.to_string(), notify_cseq));
                    }
                }
                Err(e) => {
                    // Best effort: the watcher will resynchronise on
                    // its next refresh.
                    warn!(
                        "NOTIFY for {} on subscription {} not sent: {}",
                        aor_id, cs.id, e
                    );
                }
            }
        }
        sent_cseqs
    }
}

/// The Subscription-State header for a classified subscription.
fn subscription_state_header(cs: &ClassifiedSubscription<'_>, now: i64) -> String {
    if cs.event.is_terminal() {
        match cs.termination_reason {
            Some(TerminationReason::Timeout) => "terminated;reason=timeout".to_string(),
            Some(TerminationReason::Deactivated) => {
                "terminated;reason=deactivated".to_string()
            }
            None => "terminated".to_string(),
        }
    } else {
        format!("active;expires={}", (cs.subscription.expires - now).max(0))
    }
}
