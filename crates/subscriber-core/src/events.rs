//! Event definitions for registration state changes
//!
//! Every committed mutation fans out as a sequence of events describing
//! what happened to each binding and subscription. The surrounding
//! application consumes these to drive third-party REGISTER dispatch
//! towards application servers.

use serde::{Deserialize, Serialize};

/// Registration state change events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubscriberEvent {
    /// A binding was created, refreshed or shortened
    BindingUpdated {
        aor_id: String,
        binding_id: String,
        contact_uri: String,
        expires: i64,
    },

    /// A binding ceased to exist
    BindingRemoved {
        aor_id: String,
        binding_id: String,
        contact_uri: String,
    },

    /// A subscription was created, refreshed or shortened
    SubscriptionUpdated {
        aor_id: String,
        subscription_id: String,
        expires: i64,
    },

    /// A subscription ended
    SubscriptionRemoved {
        aor_id: String,
        subscription_id: String,
    },

    /// The whole AoR was deregistered
    SubscriberDeregistered { aor_id: String },
}

/// Adapter handing subscriber events to the third-party REGISTER
/// dispatcher
///
/// The handler is optional so the core can run without an application
/// server fan-out configured.
pub struct ThirdPartyRegisterAdapter {
    handler: Option<Box<dyn Fn(SubscriberEvent) + Send + Sync>>,
}

impl ThirdPartyRegisterAdapter {
    pub fn new() -> Self {
        Self { handler: None }
    }

    /// Set the event handler.
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: Fn(SubscriberEvent) + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Deliver one event, if a handler is configured.
    pub fn dispatch(&self, event: SubscriberEvent) {
        if let Some(handler) = &self.handler {
            handler(event);
        }
    }
}

impl Default for ThirdPartyRegisterAdapter {
    fn default() -> Self {
        Self::new()
    }
}
