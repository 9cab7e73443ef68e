//! Cache key and tag construction.
//!
//! Keys are built in one place so the coordinator, the invalidation path and
//! tests cannot drift apart.

use sha2::{Digest, Sha256};
use vitrine_core::{RecordId, SearchRequest};

const RECORD_PREFIX: &str = "record:";
const SEARCH_PREFIX: &str = "search:";

/// Key of the single-record entry for `id`.
pub fn record_key(id: RecordId) -> String {
    format!("{}{}", RECORD_PREFIX, id)
}

/// Per-record tag. Stamping single-record entries with it lets an
/// invalidation beat a concurrent read that is still loading the old value.
pub fn record_tag(id: RecordId) -> String {
    format!("{}{}", RECORD_PREFIX, id)
}

/// Key of the search-result entry for `request`.
///
/// The canonical form is hashed so keys stay short and free of separators
/// whatever the free-text query contains.
pub fn search_key(request: &SearchRequest) -> String {
    let digest = Sha256::digest(request.canonical_form().as_bytes());
    format!("{}{}", SEARCH_PREFIX, hex::encode(digest))
}
