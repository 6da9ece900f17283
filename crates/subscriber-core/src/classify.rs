//! Lifecycle classification of bindings and subscriptions
//!
//! Pure comparison of an original and an updated AoR snapshot. Every
//! binding and subscription in either snapshot is classified into
//! exactly one lifecycle event; the results drive NOTIFY generation,
//! accounting, and third-party REGISTER fan-out. Classified entries
//! borrow from the two snapshots and carry no heap state of their own.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::aor::{AoR, Binding, Bindings, Subscription, Subscriptions};

/// What caused the state change being classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTrigger {
    /// The subscriber itself (REGISTER, SUBSCRIBE)
    User,
    /// Administrative action, typically HSS-driven
    Admin,
    /// An expiry timer popping
    Timeout,
}

/// Per-contact lifecycle event, as carried in reg-event state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEvent {
    /// Present and unchanged
    Registered,
    Created,
    Refreshed,
    Shortened,
    Expired,
    Deactivated,
    Unregistered,
}

impl ContactEvent {
    /// Whether the contact has ceased to exist.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContactEvent::Expired | ContactEvent::Deactivated | ContactEvent::Unregistered
        )
    }
}

/// Per-subscription lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Created,
    Refreshed,
    Unchanged,
    Shortened,
    Expired,
    Terminated,
}

impl SubscriptionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionEvent::Expired | SubscriptionEvent::Terminated)
    }
}

/// Reason parameter carried on a terminal Subscription-State header.
/// `None` on a user-initiated unsubscribe, where the final NOTIFY goes
/// out with a bare `terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Timeout,
    Deactivated,
}

/// A binding paired with its lifecycle event
#[derive(Debug, Clone, Copy)]
pub struct ClassifiedBinding<'a> {
    pub id: &'a str,
    pub binding: &'a Binding,
    pub event: ContactEvent,
}

/// A subscription paired with its lifecycle event and whether a NOTIFY
/// is owed to the watcher
#[derive(Debug, Clone)]
pub struct ClassifiedSubscription<'a> {
    pub id: &'a str,
    pub subscription: &'a Subscription,
    pub event: SubscriptionEvent,
    pub termination_reason: Option<TerminationReason>,
    pub notify_required: bool,
    /// Why a NOTIFY is required, for trace logging only
    pub reasons: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("AoR {0} has bindings but no associated URIs")]
    MissingAssociatedUris(String),
}

/// Classify both dimensions of an AoR transition. Either snapshot may
/// be absent: a missing original means the AoR was just created, a
/// missing update means it was just deleted.
pub fn classify<'a>(
    aor_id: &str,
    trigger: EventTrigger,
    orig: Option<&'a AoR>,
    updated: Option<&'a AoR>,
    now: i64,
) -> Result<(Vec<ClassifiedBinding<'a>>, Vec<ClassifiedSubscription<'a>>), ClassifyError> {
    static EMPTY_BINDINGS: Bindings = Bindings::new();
    static EMPTY_SUBSCRIPTIONS: Subscriptions = Subscriptions::new();

    if let Some(updated) = updated {
        if !updated.bindings.is_empty() && updated.associated_uris.is_empty() {
            return Err(ClassifyError::MissingAssociatedUris(aor_id.to_string()));
        }
    }

    let orig_bindings = orig.map(|a| &a.bindings).unwrap_or(&EMPTY_BINDINGS);
    let updated_bindings = updated.map(|a| &a.bindings).unwrap_or(&EMPTY_BINDINGS);
    let orig_subscriptions = orig
        .map(|a| &a.subscriptions)
        .unwrap_or(&EMPTY_SUBSCRIPTIONS);
    let updated_subscriptions = updated
        .map(|a| &a.subscriptions)
        .unwrap_or(&EMPTY_SUBSCRIPTIONS);

    // Creation and deletion of the whole AoR are not changes to the
    // registration set itself.
    let associated_uris_changed = match (orig, updated) {
        (Some(o), Some(u)) => o.associated_uris != u.associated_uris,
        _ => false,
    };

    let classified_bindings =
        classify_bindings(trigger, orig_bindings, updated_bindings, now);
    let classified_subscriptions = classify_subscriptions(
        trigger,
        orig_subscriptions,
        updated_subscriptions,
        &classified_bindings,
        associated_uris_changed,
        now,
    );

    Ok((classified_bindings, classified_subscriptions))
}

/// Classify every binding in the union of the two snapshots.
pub fn classify_bindings<'a>(
    trigger: EventTrigger,
    orig_bindings: &'a Bindings,
    updated_bindings: &'a Bindings,
    now: i64,
) -> Vec<ClassifiedBinding<'a>> {
    let ids: BTreeSet<&str> = orig_bindings
        .keys()
        .chain(updated_bindings.keys())
        .map(String::as_str)
        .collect();

    let mut classified = Vec::with_capacity(ids.len());
    for id in ids {
        let orig = orig_bindings.get(id);
        let updated = updated_bindings.get(id);
        let (binding, event) = match (orig, updated) {
            // A binding at or past its expiry is gone no matter how it
            // got that way.
            (_, Some(b)) if b.expired(now) => (b, ContactEvent::Expired),
            (None, Some(b)) => (b, ContactEvent::Created),
            (Some(o), Some(b)) => {
                let event = if b.expires > o.expires {
                    ContactEvent::Refreshed
                } else if b.expires < o.expires {
                    ContactEvent::Shortened
                } else {
                    ContactEvent::Registered
                };
                (b, event)
            }
            (Some(o), None) if o.expired(now) => (o, ContactEvent::Expired),
            (Some(o), None) => {
                let event = match trigger {
                    EventTrigger::User => ContactEvent::Unregistered,
                    EventTrigger::Admin => ContactEvent::Deactivated,
                    EventTrigger::Timeout => ContactEvent::Expired,
                };
                (o, event)
            }
            (None, None) => continue,
        };
        classified.push(ClassifiedBinding { id, binding, event });
    }
    classified
}

/// Classify every subscription in the union of the two snapshots.
///
/// A subscription missing from the updated snapshot is resolved in
/// order: cascaded by the removal of the binding sharing its contact,
/// lapsed on its own, or explicitly ended with the event shaped by the
/// trigger.
pub fn classify_subscriptions<'a>(
    trigger: EventTrigger,
    orig_subscriptions: &'a Subscriptions,
    updated_subscriptions: &'a Subscriptions,
    classified_bindings: &[ClassifiedBinding<'a>],
    associated_uris_changed: bool,
    now: i64,
) -> Vec<ClassifiedSubscription<'a>> {
    let missing_contact_uris: BTreeSet<&str> = classified_bindings
        .iter()
        .filter(|cb| cb.event.is_terminal())
        .map(|cb| cb.binding.uri.as_str())
        .collect();
    let bindings_changed = classified_bindings
        .iter()
        .any(|cb| cb.event != ContactEvent::Registered);

    let ids: BTreeSet<&str> = orig_subscriptions
        .keys()
        .chain(updated_subscriptions.keys())
        .map(String::as_str)
        .collect();

    let mut classified = Vec::with_capacity(ids.len());
    for id in ids {
        let orig = orig_subscriptions.get(id);
        let updated = updated_subscriptions.get(id);

        let mut reasons = String::new();
        let (subscription, event, termination_reason, mut notify_required) =
            match (orig, updated) {
                (None, Some(s)) => {
                    add_reason(&mut reasons, "subscription created");
                    (s, SubscriptionEvent::Created, None, true)
                }
                (Some(o), Some(s)) => {
                    let event = if s.expires > o.expires {
                        add_reason(&mut reasons, "subscription refreshed");
                        SubscriptionEvent::Refreshed
                    } else if s.expires < o.expires {
                        add_reason(&mut reasons, "subscription shortened");
                        SubscriptionEvent::Shortened
                    } else {
                        SubscriptionEvent::Unchanged
                    };
                    let lifecycle_changed = event != SubscriptionEvent::Unchanged;
                    (s, event, None, lifecycle_changed)
                }
                (Some(o), None) => {
                    if missing_contact_uris.contains(o.req_uri.as_str()) {
                        add_reason(&mut reasons, "binding sharing the contact was removed");
                        (
                            o,
                            SubscriptionEvent::Terminated,
                            Some(TerminationReason::Deactivated),
                            true,
                        )
                    } else if o.expired(now) {
                        add_reason(&mut reasons, "subscription expired");
                        (
                            o,
                            SubscriptionEvent::Expired,
                            Some(TerminationReason::Timeout),
                            true,
                        )
                    } else {
                        match trigger {
                            EventTrigger::User => {
                                add_reason(&mut reasons, "unsubscribed");
                                (o, SubscriptionEvent::Terminated, None, true)
                            }
                            EventTrigger::Admin => {
                                add_reason(&mut reasons, "administratively removed");
                                (
                                    o,
                                    SubscriptionEvent::Terminated,
                                    Some(TerminationReason::Deactivated),
                                    true,
                                )
                            }
                            EventTrigger::Timeout => {
                                add_reason(&mut reasons, "subscription timed out");
                                (
                                    o,
                                    SubscriptionEvent::Expired,
                                    Some(TerminationReason::Timeout),
                                    true,
                                )
                            }
                        }
                    }
                }
                (None, None) => continue,
            };

        // Surviving watchers are owed a NOTIFY whenever the reg-info
        // body they last saw is stale, even if their own subscription
        // did not move.
        if !event.is_terminal() {
            if associated_uris_changed {
                add_reason(&mut reasons, "associated URIs changed");
                notify_required = true;
            }
            if bindings_changed {
                add_reason(&mut reasons, "binding state changed");
                notify_required = true;
            }
        }

        classified.push(ClassifiedSubscription {
            id,
            subscription,
            event,
            termination_reason,
            notify_required,
            reasons,
        });
    }
    classified
}

fn add_reason(reasons: &mut String, reason: &str) {
    if !reasons.is_empty() {
        reasons.push_str("; ");
    }
    reasons.push_str(reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aor::AssociatedUris;

    const NOW: i64 = 1_000_000;

    fn binding(uri: &str, expires: i64) -> Binding {
        Binding {
            address_of_record: "sip:alice@example.com".to_string(),
            uri: uri.to_string(),
            call_id: "cid".to_string(),
            cseq: 1,
            expires,
            q: None,
            path_headers: vec![],
            private_id: None,
            emergency: false,
            timer_id: None,
        }
    }

    fn subscription(req_uri: &str, expires: i64) -> Subscription {
        Subscription {
            req_uri: req_uri.to_string(),
            from_uri: "sip:w@example.com".to_string(),
            from_tag: "ft".to_string(),
            to_uri: "sip:alice@example.com".to_string(),
            to_tag: "tt".to_string(),
            call_id: "sub-cid".to_string(),
            routes: vec![],
            expires,
            last_notify_cseq: 0,
        }
    }

    fn aor_with(bindings: Vec<(&str, Binding)>, subs: Vec<(&str, Subscription)>) -> AoR {
        let mut aor = AoR::new("sip:scscf.example.com");
        aor.associated_uris.add_uri("sip:alice@example.com", false);
        for (id, b) in bindings {
            aor.bindings.insert(id.to_string(), b);
        }
        for (id, s) in subs {
            aor.subscriptions.insert(id.to_string(), s);
        }
        aor
    }

    fn event_of(classified: &[ClassifiedBinding<'_>], id: &str) -> ContactEvent {
        classified.iter().find(|cb| cb.id == id).unwrap().event
    }

    #[test]
    fn test_contact_event_table() {
        let orig = aor_with(
            vec![
                ("kept", binding("sip:a@1", NOW + 100)),
                ("longer", binding("sip:a@2", NOW + 100)),
                ("shorter", binding("sip:a@3", NOW + 100)),
                ("gone", binding("sip:a@4", NOW + 100)),
            ],
            vec![],
        );
        let updated = aor_with(
            vec![
                ("kept", binding("sip:a@1", NOW + 100)),
                ("longer", binding("sip:a@2", NOW + 200)),
                ("shorter", binding("sip:a@3", NOW + 50)),
                ("new", binding("sip:a@5", NOW + 100)),
            ],
            vec![],
        );

        let classified = classify_bindings(
            EventTrigger::User,
            &orig.bindings,
            &updated.bindings,
            NOW,
        );
        assert_eq!(classified.len(), 5);
        assert_eq!(event_of(&classified, "kept"), ContactEvent::Registered);
        assert_eq!(event_of(&classified, "longer"), ContactEvent::Refreshed);
        assert_eq!(event_of(&classified, "shorter"), ContactEvent::Shortened);
        assert_eq!(event_of(&classified, "gone"), ContactEvent::Unregistered);
        assert_eq!(event_of(&classified, "new"), ContactEvent::Created);
    }

    #[test]
    fn test_removal_event_follows_trigger() {
        let orig = aor_with(vec![("b1", binding("sip:a@1", NOW + 100))], vec![]);
        let empty = Bindings::new();

        for (trigger, expected) in [
            (EventTrigger::User, ContactEvent::Unregistered),
            (EventTrigger::Admin, ContactEvent::Deactivated),
            (EventTrigger::Timeout, ContactEvent::Expired),
        ] {
            let classified = classify_bindings(trigger, &orig.bindings, &empty, NOW);
            assert_eq!(classified[0].event, expected);
        }
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        // A binding expiring exactly now is dead, wherever it appears.
        let orig = aor_with(vec![("b1", binding("sip:a@1", NOW))], vec![]);
        let empty = Bindings::new();
        let classified =
            classify_bindings(EventTrigger::User, &orig.bindings, &empty, NOW);
        assert_eq!(classified[0].event, ContactEvent::Expired);

        let classified =
            classify_bindings(EventTrigger::User, &empty, &orig.bindings, NOW);
        assert_eq!(classified[0].event, ContactEvent::Expired);
    }

    #[test]
    fn test_identity_transition_is_quiescent() {
        // Comparing a snapshot against itself yields only
        // REGISTERED/UNCHANGED and no NOTIFYs.
        let aor = aor_with(
            vec![
                ("b1", binding("sip:a@1", NOW + 100)),
                ("b2", binding("sip:a@2", NOW + 200)),
            ],
            vec![("s1", subscription("sip:a@1", NOW + 300))],
        );

        let (cbs, css) =
            classify("sip:alice@example.com", EventTrigger::User, Some(&aor), Some(&aor), NOW)
                .unwrap();
        assert!(cbs.iter().all(|cb| cb.event == ContactEvent::Registered));
        assert!(css
            .iter()
            .all(|cs| cs.event == SubscriptionEvent::Unchanged && !cs.notify_required));
    }

    #[test]
    fn test_associated_uri_change_notifies_unchanged_watchers() {
        let orig = aor_with(
            vec![("b1", binding("sip:a@1", NOW + 100))],
            vec![("s1", subscription("sip:a@1", NOW + 300))],
        );
        let mut updated = orig.clone();
        let mut uris = AssociatedUris::new();
        uris.add_uri("sip:alice@example.com", false);
        uris.add_uri("sip:alice2@example.com", false);
        updated.associated_uris = uris;

        let (cbs, css) =
            classify("sip:alice@example.com", EventTrigger::Admin, Some(&orig), Some(&updated), NOW)
                .unwrap();
        assert_eq!(cbs[0].event, ContactEvent::Registered);
        assert_eq!(css[0].event, SubscriptionEvent::Unchanged);
        assert!(css[0].notify_required);
        assert!(css[0].reasons.contains("associated URIs changed"));
    }

    #[test]
    fn test_cascade_outranks_trigger() {
        // The subscription vanishes together with the binding sharing
        // its contact: terminated with reason deactivated, whatever the
        // trigger was.
        let orig = aor_with(
            vec![("b1", binding("sip:a@1", NOW + 100))],
            vec![("s1", subscription("sip:a@1", NOW + 300))],
        );
        let updated = aor_with(vec![], vec![]);

        let (_, css) =
            classify("sip:alice@example.com", EventTrigger::User, Some(&orig), Some(&updated), NOW)
                .unwrap();
        assert_eq!(css[0].event, SubscriptionEvent::Terminated);
        assert_eq!(css[0].termination_reason, Some(TerminationReason::Deactivated));
        assert!(css[0].notify_required);
    }

    #[test]
    fn test_subscription_removal_causes() {
        // Natural expiry of the subscription itself.
        let orig = aor_with(
            vec![("b1", binding("sip:a@1", NOW + 100))],
            vec![("s1", subscription("sip:b@9", NOW - 5))],
        );
        let updated = aor_with(vec![("b1", binding("sip:a@1", NOW + 100))], vec![]);
        let (_, css) =
            classify("sip:alice@example.com", EventTrigger::User, Some(&orig), Some(&updated), NOW)
                .unwrap();
        assert_eq!(css[0].event, SubscriptionEvent::Expired);
        assert_eq!(css[0].termination_reason, Some(TerminationReason::Timeout));

        // User-initiated unsubscribe: terminated, no reason parameter.
        let orig = aor_with(
            vec![("b1", binding("sip:a@1", NOW + 100))],
            vec![("s1", subscription("sip:b@9", NOW + 300))],
        );
        let (_, css) =
            classify("sip:alice@example.com", EventTrigger::User, Some(&orig), Some(&updated), NOW)
                .unwrap();
        assert_eq!(css[0].event, SubscriptionEvent::Terminated);
        assert_eq!(css[0].termination_reason, None);

        // Administrative removal.
        let (_, css) =
            classify("sip:alice@example.com", EventTrigger::Admin, Some(&orig), Some(&updated), NOW)
                .unwrap();
        assert_eq!(css[0].event, SubscriptionEvent::Terminated);
        assert_eq!(css[0].termination_reason, Some(TerminationReason::Deactivated));
    }

    #[test]
    fn test_deleted_aor_classifies_everything_terminal() {
        let orig = aor_with(
            vec![
                ("b1", binding("sip:a@1", NOW + 100)),
                ("b2", binding("sip:a@2", NOW + 200)),
            ],
            vec![("s1", subscription("sip:a@1", NOW + 300))],
        );

        let (cbs, css) =
            classify("sip:alice@example.com", EventTrigger::User, Some(&orig), None, NOW).unwrap();
        assert!(cbs.iter().all(|cb| cb.event == ContactEvent::Unregistered));
        assert!(css.iter().all(|cs| cs.event.is_terminal()));
    }

    #[test]
    fn test_bindings_without_uris_rejected() {
        let mut updated = aor_with(vec![("b1", binding("sip:a@1", NOW + 100))], vec![]);
        updated.associated_uris = AssociatedUris::new();

        let err = classify("sip:alice@example.com", EventTrigger::User, None, Some(&updated), NOW)
            .unwrap_err();
        assert_eq!(
            err,
            ClassifyError::MissingAssociatedUris("sip:alice@example.com".to_string())
        );
    }
}
