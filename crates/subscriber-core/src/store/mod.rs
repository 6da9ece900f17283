//! Versioned AoR store interface
//!
//! The store owns mutual exclusion for the subscriber data: every read
//! returns an opaque version and every write carries one, so concurrent
//! writers are serialised by compare-and-swap rather than locks held in
//! this process.

use async_trait::async_trait;
use thiserror::Error;

use crate::aor::{AoR, PatchObject};

pub mod memory;

pub use memory::MemoryAorStore;

/// Opaque document version used for optimistic concurrency
pub type Version = u64;

/// Errors surfaced by a store backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// No document under this AoR ID
    #[error("document not found")]
    NotFound,

    /// The supplied version no longer matches the stored document
    #[error("version precondition failed")]
    Conflict,

    /// The backend failed or timed out
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Abstract store interface for AoR documents
///
/// Implement this trait for different backends; writes are rejected
/// with [`StoreError::Conflict`] when the caller's version is stale.
#[async_trait]
pub trait AorStore: Send + Sync {
    /// Fetch a document and its current version.
    async fn get(&self, aor_id: &str) -> Result<(AoR, Version), StoreError>;

    /// Create or replace a document. Used only for first-time
    /// registration, where no version has been observed yet.
    async fn put(&self, aor_id: &str, aor: &AoR) -> Result<Version, StoreError>;

    /// Apply a patch against the version read earlier and return the
    /// post-image. A document left with no bindings is removed from the
    /// store as part of the same commit.
    async fn patch(
        &self,
        aor_id: &str,
        patch: &PatchObject,
        version: Version,
    ) -> Result<(AoR, Version), StoreError>;

    /// Delete the document if the version still matches.
    async fn delete(&self, aor_id: &str, version: Version) -> Result<(), StoreError>;
}
