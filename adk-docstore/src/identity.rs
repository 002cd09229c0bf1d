//! Stable document identities.
//!
//! Caller-supplied ids that already look like UUIDs are kept as-is so that
//! re-submitting a document overwrites its earlier record. Anything else is
//! replaced by a name-based UUID derived from the candidate id and a SHA-256
//! hash of the metadata, so identical metadata always lands on the same row.
//! A document with no candidate id at all also hashes its content, so
//! unrelated anonymous documents sharing metadata do not collide.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::document::{DocMetaData, Document};

/// Derive the storage id for a document.
///
/// Never fails: an unusable candidate is always replaceable by a derived id.
///
/// ```
/// use adk_docstore::{DocMetaData, derive_id};
///
/// let metadata = DocMetaData::new("notes").with_id("chapter-1");
/// let id = derive_id("chapter-1", &metadata);
/// assert_eq!(id, derive_id("chapter-1", &metadata));
/// assert!(uuid::Uuid::parse_str(&id).is_ok());
/// ```
pub fn derive_id(candidate_id: &str, metadata: &DocMetaData) -> String {
    derive(candidate_id, metadata, None)
}

/// Derive the storage id of `document` from its own `metadata.id`.
///
/// Same as [`derive_id`], except that an empty candidate id folds the content
/// into the hash. Re-adding an identical anonymous document is still
/// idempotent.
pub fn document_id(document: &Document) -> String {
    let candidate = document.metadata.id.as_str();
    let content = candidate.is_empty().then_some(document.content.as_str());
    derive(candidate, &document.metadata, content)
}

fn derive(candidate_id: &str, metadata: &DocMetaData, content: Option<&str>) -> String {
    if let Ok(uuid) = Uuid::parse_str(candidate_id) {
        return uuid.hyphenated().to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical_repr(metadata).as_bytes());
    if let Some(content) = content {
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
    }
    let hash = format!("{:x}", hasher.finalize());

    let combined = format!("{candidate_id}-{hash}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, combined.as_bytes()).to_string()
}

/// `serde_json::Value` objects keep their keys sorted, which makes the
/// serialized form independent of insertion order.
fn canonical_repr(metadata: &DocMetaData) -> String {
    serde_json::to_value(metadata)
        .and_then(|value| serde_json::to_string(&value))
        .unwrap_or_else(|_| format!("{metadata:?}"))
}
