//! Subscriber manager
//!
//! Orchestrates every registration state change: fetches the current
//! AoR, synthesises the target state, commits it through the versioned
//! store (retrying bounded times on contention), then runs the
//! post-commit pipeline in a fixed order: classification, NOTIFYs,
//! accounting, HSS deregistration when the last binding went, and
//! third-party REGISTER fan-out. Failures past the commit never unwind
//! it; the store-visible change is the operation's outcome.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::analytics::AnalyticsSink;
use crate::aor::{AoR, AssociatedUris, Bindings, PatchObject, Subscription, Subscriptions};
use crate::classify::{
    classify, ClassifiedBinding, ClassifiedSubscription, ContactEvent, EventTrigger,
    SubscriptionEvent,
};
use crate::config::SubscriberConfig;
use crate::error::{Result, SubscriberError};
use crate::events::{SubscriberEvent, ThirdPartyRegisterAdapter};
use crate::hss::{self, HssClient, IrsInfo, IrsQuery};
use crate::notify::{NotifyDispatcher, NotifySender};
use crate::store::{AorStore, StoreError, Version};

/// The subscriber state core's public face
pub struct SubscriberManager {
    store: Arc<dyn AorStore>,
    hss: Arc<dyn HssClient>,
    analytics: Arc<dyn AnalyticsSink>,
    notify_sender: NotifySender,
    third_party: ThirdPartyRegisterAdapter,
    config: SubscriberConfig,
}

impl SubscriberManager {
    pub fn new(
        store: Arc<dyn AorStore>,
        hss: Arc<dyn HssClient>,
        analytics: Arc<dyn AnalyticsSink>,
        notify_dispatcher: Arc<dyn NotifyDispatcher>,
    ) -> Self {
        Self::with_config(
            store,
            hss,
            analytics,
            notify_dispatcher,
            SubscriberConfig::default(),
        )
    }

    pub fn with_config(
        store: Arc<dyn AorStore>,
        hss: Arc<dyn HssClient>,
        analytics: Arc<dyn AnalyticsSink>,
        notify_dispatcher: Arc<dyn NotifyDispatcher>,
        config: SubscriberConfig,
    ) -> Self {
        Self {
            store,
            hss,
            analytics,
            notify_sender: NotifySender::new(notify_dispatcher),
            third_party: ThirdPartyRegisterAdapter::new(),
            config,
        }
    }

    /// Install the handler that receives third-party REGISTER events.
    pub fn set_third_party_handler<F>(&mut self, handler: F)
    where
        F: Fn(SubscriberEvent) + Send + Sync + 'static,
    {
        self.third_party.set_handler(handler);
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    /// First-time registration: create the AoR with the supplied
    /// bindings. An AoR that already exists is handled with
    /// re-registration semantics instead.
    pub async fn register_subscriber(
        &self,
        aor_id: &str,
        scscf_uri: &str,
        associated_uris: &AssociatedUris,
        add_bindings: Bindings,
    ) -> Result<Bindings> {
        if add_bindings.is_empty() {
            return Err(SubscriberError::InvalidInput(
                "registration without bindings".to_string(),
            ));
        }
        if associated_uris.is_empty() {
            return Err(SubscriberError::InvalidInput(
                "registration without associated URIs".to_string(),
            ));
        }

        match self.store.get(aor_id).await {
            Ok(_) => {
                debug!("AoR {} already exists, re-registering", aor_id);
                return self
                    .reregister_subscriber(aor_id, associated_uris, &add_bindings, &[])
                    .await
                    .map(|(bindings, _)| bindings);
            }
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(map_store_err(aor_id, e)),
        }

        let now = Self::now();
        let mut aor = AoR::new(scscf_uri);
        aor.bindings = add_bindings;
        aor.associated_uris = associated_uris.clone();
        aor.notify_cseq = 1;

        let version = self
            .store
            .put(aor_id, &aor)
            .await
            .map_err(|e| map_store_err(aor_id, e))?;
        info!(
            "Registered {} with {} binding(s)",
            aor_id,
            aor.bindings.len()
        );

        let events = self
            .run_post_commit(aor_id, EventTrigger::User, None, Some(&aor), Some(version), now)
            .await;
        self.publish_events(events);

        Ok(aor.active_bindings(now))
    }

    /// Update and remove bindings on an existing AoR. Subscriptions
    /// whose contact disappears or changes URI are removed in the same
    /// commit. Returns the surviving bindings, and the HSS view when
    /// the update deregistered the subscriber entirely.
    pub async fn reregister_subscriber(
        &self,
        aor_id: &str,
        associated_uris: &AssociatedUris,
        updated_bindings: &Bindings,
        binding_ids_to_remove: &[String],
    ) -> Result<(Bindings, Option<IrsInfo>)> {
        if associated_uris.is_empty() {
            return Err(SubscriberError::InvalidInput(
                "re-registration without associated URIs".to_string(),
            ));
        }
        let now = Self::now();
        let (orig_aor, updated_aor, version) = self
            .patch_bindings_with_retry(
                aor_id,
                associated_uris,
                updated_bindings,
                binding_ids_to_remove,
            )
            .await?;

        let events = self
            .run_post_commit(
                aor_id,
                EventTrigger::User,
                Some(&orig_aor),
                Some(&updated_aor),
                Some(version),
                now,
            )
            .await;

        let mut irs_info = None;
        if !updated_aor.has_active_bindings(now) {
            irs_info = self
                .deregister_with_hss(aor_id, hss::DEREG_USER, &updated_aor.scscf_uri)
                .await;
        }
        self.publish_events(events);

        Ok((updated_aor.active_bindings(now), irs_info))
    }

    /// Remove specific bindings for a public identity. A missing AoR
    /// counts as success, the bindings are equally gone.
    pub async fn remove_bindings(
        &self,
        public_id: &str,
        binding_ids: &[String],
        trigger: EventTrigger,
    ) -> Result<Bindings> {
        let (aor_id, irs_info) = self.get_cached_default_id(public_id).await?;
        let now = Self::now();

        let (orig_aor, updated_aor, version) = match self
            .patch_bindings_with_retry(
                &aor_id,
                &irs_info.associated_uris,
                &Bindings::new(),
                binding_ids,
            )
            .await
        {
            Ok(committed) => committed,
            Err(SubscriberError::NotFound(_)) => return Ok(Bindings::new()),
            Err(e) => return Err(e),
        };

        let events = self
            .run_post_commit(
                &aor_id,
                trigger,
                Some(&orig_aor),
                Some(&updated_aor),
                Some(version),
                now,
            )
            .await;

        if !updated_aor.has_active_bindings(now) {
            self.deregister_with_hss(&aor_id, hss::dereg_reason(trigger), &updated_aor.scscf_uri)
                .await;
        }
        self.publish_events(events);

        Ok(updated_aor.active_bindings(now))
    }

    /// Create or refresh a reg-event subscription.
    pub async fn update_subscription(
        &self,
        public_id: &str,
        subscription_id: &str,
        subscription: Subscription,
    ) -> Result<IrsInfo> {
        self.modify_subscription(public_id, Some((subscription_id, subscription)), None)
            .await
    }

    /// End a reg-event subscription at the watcher's request.
    pub async fn remove_subscription(
        &self,
        public_id: &str,
        subscription_id: &str,
    ) -> Result<IrsInfo> {
        self.modify_subscription(public_id, None, Some(subscription_id))
            .await
    }

    /// Remove the subscriber entirely: the AoR document is deleted, all
    /// watchers get a final NOTIFY, and the HSS is told why.
    pub async fn deregister_subscriber(
        &self,
        public_id: &str,
        trigger: EventTrigger,
    ) -> Result<()> {
        let (aor_id, _irs_info) = self.get_cached_default_id(public_id).await?;
        let now = Self::now();

        let mut deleted: Option<AoR> = None;
        for attempt in 1..=self.config.max_patch_attempts {
            let (aor, version) = match self.store.get(&aor_id).await {
                Ok(read) => read,
                Err(StoreError::NotFound) => return Ok(()),
                Err(e) => return Err(map_store_err(&aor_id, e)),
            };
            match self.store.delete(&aor_id, version).await {
                Ok(()) => {
                    deleted = Some(aor);
                    break;
                }
                Err(StoreError::NotFound) => return Ok(()),
                Err(StoreError::Conflict) => {
                    debug!(
                        "Version conflict deleting {} (attempt {}), retrying",
                        aor_id, attempt
                    );
                }
                Err(e) => return Err(map_store_err(&aor_id, e)),
            }
        }
        let Some(orig_aor) = deleted else {
            return Err(SubscriberError::VersionConflict(self.config.max_patch_attempts));
        };
        info!("Deregistered {}", aor_id);

        let mut events = self
            .run_post_commit(&aor_id, trigger, Some(&orig_aor), None, None, now)
            .await;
        events.push(SubscriberEvent::SubscriberDeregistered {
            aor_id: aor_id.clone(),
        });

        self.deregister_with_hss(&aor_id, hss::dereg_reason(trigger), &orig_aor.scscf_uri)
            .await;
        self.publish_events(events);

        Ok(())
    }

    /// Replace the registration set stored in an AoR. Watchers are
    /// notified even though no binding moved.
    pub async fn update_associated_uris(
        &self,
        aor_id: &str,
        associated_uris: &AssociatedUris,
    ) -> Result<()> {
        if associated_uris.is_empty() {
            return Err(SubscriberError::InvalidInput(
                "registration set cannot be emptied".to_string(),
            ));
        }
        let now = Self::now();
        for attempt in 1..=self.config.max_patch_attempts {
            let (orig_aor, version) = self
                .store
                .get(aor_id)
                .await
                .map_err(|e| map_store_err(aor_id, e))?;
            let patch = PatchObject::new()
                .associated_uris(associated_uris.clone())
                .increment_cseq();
            match self.store.patch(aor_id, &patch, version).await {
                Ok((updated_aor, new_version)) => {
                    let events = self
                        .run_post_commit(
                            aor_id,
                            EventTrigger::Admin,
                            Some(&orig_aor),
                            Some(&updated_aor),
                            Some(new_version),
                            now,
                        )
                        .await;
                    self.publish_events(events);
                    return Ok(());
                }
                Err(StoreError::Conflict) => {
                    debug!(
                        "Version conflict updating URIs of {} (attempt {}), retrying",
                        aor_id, attempt
                    );
                }
                Err(e) => return Err(map_store_err(aor_id, e)),
            }
        }
        Err(SubscriberError::VersionConflict(self.config.max_patch_attempts))
    }

    /// Strip lapsed bindings and subscriptions from an AoR after an
    /// expiry timer popped.
    pub async fn handle_timer_pop(&self, aor_id: &str) -> Result<()> {
        let now = Self::now();
        for attempt in 1..=self.config.max_patch_attempts {
            let (orig_aor, version) = match self.store.get(aor_id).await {
                Ok(read) => read,
                Err(StoreError::NotFound) => return Ok(()),
                Err(e) => return Err(map_store_err(aor_id, e)),
            };

            let expired_binding_ids: Vec<String> = orig_aor
                .bindings
                .iter()
                .filter(|(_, b)| b.expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            let mut expired_subscription_ids: Vec<String> = orig_aor
                .subscriptions
                .iter()
                .filter(|(_, s)| s.expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            for cascaded in subscriptions_to_remove(
                &orig_aor.bindings,
                &orig_aor.subscriptions,
                &Bindings::new(),
                &expired_binding_ids,
            ) {
                if !expired_subscription_ids.contains(&cascaded) {
                    expired_subscription_ids.push(cascaded);
                }
            }
            if expired_binding_ids.is_empty() && expired_subscription_ids.is_empty() {
                return Ok(());
            }

            let patch = PatchObject::new()
                .remove_bindings(expired_binding_ids)
                .remove_subscriptions(expired_subscription_ids)
                .increment_cseq();
            match self.store.patch(aor_id, &patch, version).await {
                Ok((updated_aor, new_version)) => {
                    let events = self
                        .run_post_commit(
                            aor_id,
                            EventTrigger::Timeout,
                            Some(&orig_aor),
                            Some(&updated_aor),
                            Some(new_version),
                            now,
                        )
                        .await;
                    if !updated_aor.has_active_bindings(now) {
                        self.deregister_with_hss(
                            aor_id,
                            hss::DEREG_TIMEOUT,
                            &updated_aor.scscf_uri,
                        )
                        .await;
                    }
                    self.publish_events(events);
                    return Ok(());
                }
                Err(StoreError::Conflict) => {
                    debug!(
                        "Version conflict expiring {} (attempt {}), retrying",
                        aor_id, attempt
                    );
                }
                Err(StoreError::NotFound) => return Ok(()),
                Err(e) => return Err(map_store_err(aor_id, e)),
            }
        }
        Err(SubscriberError::VersionConflict(self.config.max_patch_attempts))
    }

    /// Consume expiry events published by the store until the channel
    /// closes.
    pub async fn run_expiry_loop(&self, mut expiry_events: mpsc::Receiver<String>) {
        while let Some(aor_id) = expiry_events.recv().await {
            if let Err(e) = self.handle_timer_pop(&aor_id).await {
                warn!("Expiry handling for {} failed: {}", aor_id, e);
            }
        }
    }

    /// The bindings currently stored for an AoR ID. Callers must pass
    /// the default public identity; other set members do not key a
    /// document.
    pub async fn get_bindings(&self, aor_id: &str) -> Result<Bindings> {
        let (aor, _) = self
            .store
            .get(aor_id)
            .await
            .map_err(|e| map_store_err(aor_id, e))?;
        Ok(aor.active_bindings(Self::now()))
    }

    /// The subscriptions currently stored for an AoR ID.
    pub async fn get_subscriptions(&self, aor_id: &str) -> Result<Subscriptions> {
        let (aor, _) = self
            .store
            .get(aor_id)
            .await
            .map_err(|e| map_store_err(aor_id, e))?;
        Ok(aor.active_subscriptions(Self::now()))
    }

    /// Cached subscriber state for a public identity.
    pub async fn get_cached_subscriber_state(&self, public_id: &str) -> Result<IrsInfo> {
        self.hss
            .get_registration_data(public_id)
            .await
            .map_err(|e| map_hss_err(public_id, e))
    }

    /// Subscriber state for a public identity, going to the HSS when
    /// nothing is cached.
    pub async fn get_subscriber_state(&self, query: &IrsQuery) -> Result<IrsInfo> {
        self.hss
            .update_registration_state(query)
            .await
            .map_err(|e| map_hss_err(&query.public_id, e))
    }

    async fn modify_subscription(
        &self,
        public_id: &str,
        update: Option<(&str, Subscription)>,
        remove: Option<&str>,
    ) -> Result<IrsInfo> {
        let (aor_id, irs_info) = self.get_cached_default_id(public_id).await?;
        let now = Self::now();

        for attempt in 1..=self.config.max_patch_attempts {
            let (orig_aor, version) = self
                .store
                .get(&aor_id)
                .await
                .map_err(|e| map_store_err(&aor_id, e))?;
            // There is nothing to watch on a subscriber with no
            // reachable contacts.
            if !orig_aor.has_active_bindings(now) {
                return Err(SubscriberError::InvalidInput(format!(
                    "no bindings to subscribe to for {}",
                    aor_id
                )));
            }

            let mut patch = PatchObject::new().increment_cseq();
            if let Some((subscription_id, subscription)) = &update {
                patch = patch.update_subscription(*subscription_id, subscription.clone());
            }
            if let Some(subscription_id) = remove {
                patch = patch.remove_subscriptions(vec![subscription_id.to_string()]);
            }

            match self.store.patch(&aor_id, &patch, version).await {
                Ok((updated_aor, new_version)) => {
                    let events = self
                        .run_post_commit(
                            &aor_id,
                            EventTrigger::User,
                            Some(&orig_aor),
                            Some(&updated_aor),
                            Some(new_version),
                            now,
                        )
                        .await;
                    self.publish_events(events);
                    return Ok(irs_info);
                }
                Err(StoreError::Conflict) => {
                    debug!(
                        "Version conflict on subscription change for {} (attempt {}), retrying",
                        aor_id, attempt
                    );
                }
                Err(e) => return Err(map_store_err(&aor_id, e)),
            }
        }
        Err(SubscriberError::VersionConflict(self.config.max_patch_attempts))
    }

    /// GET, compute the cascade and PATCH, retrying the whole cycle
    /// while the store reports contention. Returns the two snapshots
    /// the commit moved between, plus the committed version.
    async fn patch_bindings_with_retry(
        &self,
        aor_id: &str,
        associated_uris: &AssociatedUris,
        updated_bindings: &Bindings,
        binding_ids_to_remove: &[String],
    ) -> Result<(AoR, AoR, Version)> {
        for attempt in 1..=self.config.max_patch_attempts {
            let (orig_aor, version) = self
                .store
                .get(aor_id)
                .await
                .map_err(|e| map_store_err(aor_id, e))?;

            let subscription_ids_to_remove = subscriptions_to_remove(
                &orig_aor.bindings,
                &orig_aor.subscriptions,
                updated_bindings,
                binding_ids_to_remove,
            );

            let patch = PatchObject::new()
                .update_bindings(updated_bindings.clone())
                .remove_bindings(binding_ids_to_remove.to_vec())
                .remove_subscriptions(subscription_ids_to_remove)
                .associated_uris(associated_uris.clone())
                .increment_cseq();

            match self.store.patch(aor_id, &patch, version).await {
                Ok((updated_aor, new_version)) => {
                    return Ok((orig_aor, updated_aor, new_version))
                }
                Err(StoreError::Conflict) => {
                    debug!(
                        "Version conflict updating {} (attempt {}), retrying",
                        aor_id, attempt
                    );
                }
                Err(e) => return Err(map_store_err(aor_id, e)),
            }
        }
        Err(SubscriberError::VersionConflict(self.config.max_patch_attempts))
    }

    /// Classification, NOTIFYs and accounting for a committed change.
    /// Returns the third-party REGISTER events for the caller to
    /// publish once the HSS step has run.
    async fn run_post_commit(
        &self,
        aor_id: &str,
        trigger: EventTrigger,
        orig_aor: Option<&AoR>,
        updated_aor: Option<&AoR>,
        updated_version: Option<Version>,
        now: i64,
    ) -> Vec<SubscriberEvent> {
        let (classified_bindings, classified_subscriptions) =
            match classify(aor_id, trigger, orig_aor, updated_aor, now) {
                Ok(classified) => classified,
                Err(e) => {
                    error!("Cannot classify committed change to {}: {}", aor_id, e);
                    return Vec::new();
                }
            };

        // A deleted AoR still owes its watchers a final, correctly
        // sequenced NOTIFY: continue one past the last committed CSeq.
        let (cseq, associated_uris) = match (updated_aor, orig_aor) {
            (Some(updated), _) => (updated.notify_cseq, &updated.associated_uris),
            (None, Some(orig)) => (orig.notify_cseq + 1, &orig.associated_uris),
            (None, None) => return Vec::new(),
        };

        let sent = self
            .notify_sender
            .send_notifys(
                aor_id,
                &classified_bindings,
                &classified_subscriptions,
                associated_uris,
                cseq,
                now,
            )
            .await;

        if let Some(version) = updated_version {
            if !sent.is_empty() {
                let mut bookkeeping = PatchObject::new();
                for (subscription_id, notify_cseq) in &sent {
                    bookkeeping =
                        bookkeeping.record_notify_cseq(subscription_id.clone(), *notify_cseq);
                }
                // Best effort: a lost write only costs the watcher a
                // resynchronisation on its next refresh.
                if let Err(e) = self.store.patch(aor_id, &bookkeeping, version).await {
                    debug!("NOTIFY CSeq bookkeeping for {} skipped: {}", aor_id, e);
                }
            }
        }

        self.log_lengthened_bindings(&classified_bindings, now);
        self.log_shortened_bindings(&classified_bindings);
        self.log_lengthened_subscriptions(aor_id, &classified_subscriptions, now);
        self.log_shortened_subscriptions(aor_id, &classified_subscriptions);

        subscriber_events(aor_id, &classified_bindings, &classified_subscriptions)
    }

    fn log_lengthened_bindings(&self, classified: &[ClassifiedBinding<'_>], now: i64) {
        for cb in classified {
            if matches!(
                cb.event,
                ContactEvent::Created | ContactEvent::Refreshed | ContactEvent::Shortened
            ) {
                self.analytics.registration(
                    &cb.binding.address_of_record,
                    cb.id,
                    &cb.binding.uri,
                    cb.binding.expires - now,
                );
            }
        }
    }

    fn log_shortened_bindings(&self, classified: &[ClassifiedBinding<'_>]) {
        for cb in classified {
            if cb.event.is_terminal() {
                self.analytics
                    .registration(&cb.binding.address_of_record, cb.id, &cb.binding.uri, 0);
            }
        }
    }

    fn log_lengthened_subscriptions(
        &self,
        aor_id: &str,
        classified: &[ClassifiedSubscription<'_>],
        now: i64,
    ) {
        for cs in classified {
            if matches!(
                cs.event,
                SubscriptionEvent::Created
                    | SubscriptionEvent::Refreshed
                    | SubscriptionEvent::Shortened
            ) {
                self.analytics.subscription(
                    aor_id,
                    cs.id,
                    &cs.subscription.req_uri,
                    cs.subscription.expires - now,
                );
            }
        }
    }

    fn log_shortened_subscriptions(
        &self,
        aor_id: &str,
        classified: &[ClassifiedSubscription<'_>],
    ) {
        for cs in classified {
            if cs.event.is_terminal() {
                self.analytics
                    .subscription(aor_id, cs.id, &cs.subscription.req_uri, 0);
            }
        }
    }

    async fn get_cached_default_id(&self, public_id: &str) -> Result<(String, IrsInfo)> {
        let irs_info = self.get_cached_subscriber_state(public_id).await?;
        let aor_id = irs_info
            .associated_uris
            .default_impu(false)
            .ok_or_else(|| {
                SubscriberError::InvalidInput(format!(
                    "no default public identity for {}",
                    public_id
                ))
            })?
            .to_string();
        Ok((aor_id, irs_info))
    }

    async fn deregister_with_hss(
        &self,
        aor_id: &str,
        reason: &str,
        server_name: &str,
    ) -> Option<IrsInfo> {
        let query = IrsQuery {
            public_id: aor_id.to_string(),
            req_type: reason.to_string(),
            server_name: server_name.to_string(),
        };
        match self.hss.update_registration_state(&query).await {
            Ok(irs_info) => {
                info!("Deregistered {} with HSS ({})", aor_id, reason);
                Some(irs_info)
            }
            Err(e) => {
                warn!("HSS deregistration for {} failed: {}", aor_id, e);
                None
            }
        }
    }

    fn publish_events(&self, events: Vec<SubscriberEvent>) {
        for event in events {
            self.third_party.dispatch(event);
        }
    }
}

/// Subscriptions that must go because the binding sharing their contact
/// is being removed, or is being rewritten to a different contact URI.
fn subscriptions_to_remove(
    orig_bindings: &Bindings,
    orig_subscriptions: &Subscriptions,
    update_bindings: &Bindings,
    remove_binding_ids: &[String],
) -> Vec<String> {
    let mut missing_uris: BTreeSet<&str> = BTreeSet::new();
    for binding_id in remove_binding_ids {
        if let Some(binding) = orig_bindings.get(binding_id) {
            missing_uris.insert(binding.uri.as_str());
        }
    }
    for (binding_id, updated) in update_bindings {
        if let Some(orig) = orig_bindings.get(binding_id) {
            if orig.uri != updated.uri {
                missing_uris.insert(orig.uri.as_str());
            }
        }
    }

    let mut subscription_ids = Vec::new();
    for (subscription_id, subscription) in orig_subscriptions {
        if missing_uris.contains(subscription.req_uri.as_str()) {
            debug!(
                "Subscription {} goes with its contact {}",
                subscription_id, subscription.req_uri
            );
            subscription_ids.push(subscription_id.clone());
        }
    }
    subscription_ids
}

/// Third-party REGISTER events for a classified change.
fn subscriber_events(
    aor_id: &str,
    classified_bindings: &[ClassifiedBinding<'_>],
    classified_subscriptions: &[ClassifiedSubscription<'_>],
) -> Vec<SubscriberEvent> {
    let mut events = Vec::new();
    for cb in classified_bindings {
        match cb.event {
            ContactEvent::Created | ContactEvent::Refreshed | ContactEvent::Shortened => {
                events.push(SubscriberEvent::BindingUpdated {
                    aor_id: aor_id.to_string(),
                    binding_id: cb.id.to_string(),
                    contact_uri: cb.binding.uri.clone(),
                    expires: cb.binding.expires,
                });
            }
            ContactEvent::Expired | ContactEvent::Deactivated | ContactEvent::Unregistered => {
                events.push(SubscriberEvent::BindingRemoved {
                    aor_id: aor_id.to_string(),
                    binding_id: cb.id.to_string(),
                    contact_uri: cb.binding.uri.clone(),
                });
            }
            ContactEvent::Registered => {}
        }
    }
    for cs in classified_subscriptions {
        match cs.event {
            SubscriptionEvent::Created
            | SubscriptionEvent::Refreshed
            | SubscriptionEvent::Shortened => {
                events.push(SubscriberEvent::SubscriptionUpdated {
                    aor_id: aor_id.to_string(),
                    subscription_id: cs.id.to_string(),
                    expires: cs.subscription.expires,
                });
            }
            SubscriptionEvent::Expired | SubscriptionEvent::Terminated => {
                events.push(SubscriberEvent::SubscriptionRemoved {
                    aor_id: aor_id.to_string(),
                    subscription_id: cs.id.to_string(),
                });
            }
            SubscriptionEvent::Unchanged => {}
        }
    }
    events
}

fn map_store_err(aor_id: &str, e: StoreError) -> SubscriberError {
    match e {
        StoreError::NotFound => SubscriberError::NotFound(aor_id.to_string()),
        StoreError::Conflict => {
            SubscriberError::StoreUnavailable("unexpected version conflict".to_string())
        }
        StoreError::Unavailable(message) => SubscriberError::StoreUnavailable(message),
    }
}

fn map_hss_err(public_id: &str, e: hss::HssError) -> SubscriberError {
    match e {
        hss::HssError::NotFound => SubscriberError::HssNotFound(public_id.to_string()),
        hss::HssError::Unavailable(message) => SubscriberError::HssUnavailable(message),
    }
}
