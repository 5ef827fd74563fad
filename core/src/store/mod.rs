//! Storage-agnostic durable store contract.
//!
//! Engines read and write JSON documents through [`DurableStore`] and never
//! branch on backend type — the backend is chosen once at process startup
//! (see [`crate::config`]). Two conforming backends exist: an atomic
//! file-backed JSON store ([`file::FileStore`]) and a transactional
//! relational store ([`postgres::PgStore`]). Both persist the same document
//! shapes byte-for-byte so callers are backend-agnostic.

pub mod file;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;

/// The collections the feedback core persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Comments,
    Ratings,
    InboxEvents,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Comments,
        Collection::Ratings,
        Collection::InboxEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comments => "comments",
            Self::Ratings => "ratings",
            Self::InboxEvents => "inbox_events",
        }
    }
}

/// Result of an upsert: the stored document plus whether it was created
/// (first write for the key) or updated in place.
#[derive(Debug)]
pub struct UpsertOutcome {
    pub record: Value,
    pub created: bool,
}

/// Mutation applied to an existing document during an upsert. `Fn` rather
/// than `FnOnce` so the relational backend can re-apply it when it loses an
/// insert race and retries down the update path.
pub type UpsertMutator = Box<dyn Fn(&mut Value) + Send + Sync>;

/// Read/append/upsert contract shared by both backends.
///
/// Document conventions: every document carries a string `id`; comment and
/// rating documents carry `subject_id`; inbox event documents carry
/// `recipient_handle`. Upserted documents additionally carry the
/// `unique_key` they were stored under (injected by the backend on create),
/// which typed readers simply ignore.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Value>, CoreError>;

    async fn list_by_subject(
        &self,
        collection: Collection,
        subject_id: &str,
    ) -> Result<Vec<Value>, CoreError>;

    /// Inbox reads: all documents whose `recipient_handle` matches.
    async fn list_by_recipient(
        &self,
        collection: Collection,
        recipient_handle: &str,
    ) -> Result<Vec<Value>, CoreError>;

    async fn append(&self, collection: Collection, record: Value) -> Result<Value, CoreError>;

    /// Create `insert` if no document exists under `unique_key`, else apply
    /// `mutate` to the existing document. Atomic per backend: the relational
    /// backend serializes on a unique index, the file backend on its
    /// per-collection mutex (intra-process only).
    async fn upsert(
        &self,
        collection: Collection,
        unique_key: &str,
        insert: Value,
        mutate: UpsertMutator,
    ) -> Result<UpsertOutcome, CoreError>;
}

/// Fetch a required string field from a document, surfacing a storage error
/// on shape drift rather than panicking.
pub(crate) fn doc_str(record: &Value, field: &str) -> Result<String, CoreError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoreError::Storage(format!("document missing string field `{field}`")))
}

/// Optional string field accessor for fields that only some collections carry.
/// The returned slice borrows from the document, not the field name.
pub(crate) fn doc_str_opt<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}
