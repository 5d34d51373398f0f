//! Validation and sizing constants (see spec §3.1).

/// Minimum allowed length for `MemoryUnit::content`.
pub const MIN_CONTENT_LEN: usize = 1;

/// Maximum allowed length for `MemoryUnit::content` (50,000 chars).
pub const MAX_CONTENT_LEN: usize = 50_000;

/// Maximum length of a single tag string.
pub const MAX_TAG_LEN: usize = 50;

/// Default cap on `list_memories`/`retrieve_memories` page size.
pub const MAX_LIST_LIMIT: usize = 100;

/// Default number of recent queries retained per conversation session.
pub const DEFAULT_RECENT_QUERIES_CAP: usize = 10;

/// Minimum BM25 candidate pool size, regardless of requested limit (§4.3).
pub const MIN_BM25_POOL: usize = 50;

/// Multiplier applied to the requested limit to size the BM25 candidate pool.
pub const BM25_POOL_MULTIPLIER: usize = 3;

/// RRF fusion constant `k` (§4.3).
pub const RRF_K: f64 = 60.0;

/// Default fetch multiplier applied when a session is attached, to leave
/// enough headroom after removing previously-shown ids (§4.5).
pub const DEFAULT_DEDUP_MULTIPLIER: usize = 3;

/// Maximum multiple of the original query length that query expansion may
/// grow to (§4.5).
pub const QUERY_EXPANSION_MAX_MULTIPLE: usize = 3;

/// Cosine similarity threshold above which two memories are considered
/// near-duplicates for `find_duplicate_memories` / quality duplication scoring.
pub const NEAR_DUPLICATE_THRESHOLD: f32 = 0.95;

/// Cosine similarity threshold above which code is flagged `duplicated` by
/// the quality analyzer (§4.11).
pub const DUPLICATION_FLAG_THRESHOLD: f32 = 0.85;

/// "similar" threshold used only for `find_similar_code` response text (§4.9).
pub const SIMILAR_CODE_THRESHOLD: f32 = 0.80;
