//! Document-store contract.
//!
//! The backing service is an external collaborator; this crate depends only
//! on its operations: create/overwrite, partial field-level update, and get.
//! Field updates are atomic per field, so a scalar overwrite and a set-union
//! on `deviceTokens` never clobber each other and concurrent writers follow
//! "last write per field wins" without document-level locking.

use serde_json::Value;
use thiserror::Error;

mod memory;

pub use memory::MemoryStore;

/// A stored document: a flat map of field name to JSON value.
pub type Document = serde_json::Map<String, Value>;

/// One field-level write.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Overwrite the field with a plain value.
    Set(Value),
    /// Stamp the field with the store's server-side time, not the client
    /// clock.
    ServerTimestamp,
    /// Set-semantics add to a string-array field; present values are not
    /// duplicated.
    ArrayUnion(Vec<String>),
    /// Set-semantics removal from a string-array field; absent values are a
    /// no-op.
    ArrayRemove(Vec<String>),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },
    #[error("document store unavailable")]
    Unavailable,
    #[error("document store error: {0}")]
    Backend(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Key-value document store with field-level update semantics.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or fully overwrite a document.
    async fn set(
        &self,
        collection: &str,
        key: &str,
        fields: Vec<(String, FieldOp)>,
    ) -> Result<(), StoreError>;

    /// Apply field-level updates to an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] when the document does not exist;
    /// callers racing against document creation must tolerate that.
    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Vec<(String, FieldOp)>,
    ) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError>;
}
