//! HSS client interface
//!
//! The subscriber core consults the HSS for two things: resolving a
//! public identity to the default identity of its implicit registration
//! set, and signalling registration state transitions with a Cx
//! server-assignment request. Transport and caching live behind the
//! trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aor::AssociatedUris;
use crate::classify::EventTrigger;

/// Deregistration reason sent on the wire when the subscriber left of
/// its own accord
pub const DEREG_USER: &str = "dereg-user";

/// Deregistration reason for administratively removed subscribers
pub const DEREG_ADMIN: &str = "dereg-admin";

/// Deregistration reason for registrations that lapsed
pub const DEREG_TIMEOUT: &str = "dereg-timeout";

/// The wire reason string for a deregistration caused by `trigger`.
pub fn dereg_reason(trigger: EventTrigger) -> &'static str {
    match trigger {
        EventTrigger::User => DEREG_USER,
        EventTrigger::Admin => DEREG_ADMIN,
        EventTrigger::Timeout => DEREG_TIMEOUT,
    }
}

/// Subscriber state returned by the HSS for an implicit registration set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrsInfo {
    /// The public identities registered together, default first
    pub associated_uris: AssociatedUris,

    /// Registration state as the HSS sees it
    pub regstate: String,
}

/// A server-assignment style query against the HSS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrsQuery {
    /// The public identity the request concerns
    pub public_id: String,

    /// Request type, e.g. one of the deregistration reason strings
    pub req_type: String,

    /// The S-CSCF issuing the request
    pub server_name: String,
}

/// Errors surfaced by the HSS client
#[derive(Error, Debug)]
pub enum HssError {
    /// The HSS has no record of the public identity
    #[error("public identity not found")]
    NotFound,

    /// The HSS failed or timed out
    #[error("HSS unavailable: {0}")]
    Unavailable(String),
}

/// Abstract HSS client
#[async_trait]
pub trait HssClient: Send + Sync {
    /// Cached lookup of subscriber state for a public identity.
    async fn get_registration_data(&self, public_id: &str) -> Result<IrsInfo, HssError>;

    /// Issue a server-assignment request, fetching state or signalling
    /// a registration state change depending on the request type.
    async fn update_registration_state(&self, query: &IrsQuery) -> Result<IrsInfo, HssError>;
}
