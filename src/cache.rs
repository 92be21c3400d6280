//! TTL-keyed cache of idempotent read responses.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, http::Method};

/// Default freshness window for cached responses.
pub const DEFAULT_TTL: Duration = Duration::seconds(300);

/// Unique key identifying one cacheable call.
///
/// Query parameters are fingerprinted from a `BTreeMap`, so two requests carrying the same
/// parameters in different construction orders resolve to the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	/// HTTP verb component.
	pub method: Method,
	/// Request path component, relative to the configured origin.
	pub path: String,
	/// Base64 (no padding) SHA-256 digest of the canonical parameter serialization.
	pub params_fingerprint: String,
}
impl CacheKey {
	/// Builds a key for the provided method/path/params triple.
	pub fn new(method: Method, path: &str, params: &BTreeMap<String, String>) -> Self {
		Self {
			method,
			path: path.to_owned(),
			params_fingerprint: fingerprint_params(params),
		}
	}
}

/// Successful response payload held by the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedResponse {
	/// HTTP status code of the original response.
	pub status: u16,
	/// Parsed JSON body.
	pub data: Value,
}

#[derive(Clone, Debug)]
struct CacheEntry {
	value: CachedResponse,
	stored_at: OffsetDateTime,
}
impl CacheEntry {
	fn is_fresh_at(&self, ttl: Duration, now: OffsetDateTime) -> bool {
		now - self.stored_at < ttl
	}
}

/// Process-local, in-memory response cache.
///
/// Entries are replaced wholesale and dropped lazily once their age reaches the TTL. The cache
/// has exactly one writer (the engine); explicit eviction is reserved for logout, tests, and
/// caller-directed invalidation.
#[derive(Debug)]
pub struct ResponseCache {
	entries: RwLock<HashMap<CacheKey, CacheEntry>>,
	ttl: Duration,
}
impl ResponseCache {
	/// Creates a cache with the provided freshness window.
	pub fn new(ttl: Duration) -> Self {
		Self { entries: RwLock::new(HashMap::new()), ttl }
	}

	/// The freshness window applied to every entry.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Returns the cached value when present and younger than the TTL at `now`.
	pub fn get_at(&self, key: &CacheKey, now: OffsetDateTime) -> Option<CachedResponse> {
		{
			let entries = self.entries.read();
			let entry = entries.get(key)?;

			if entry.is_fresh_at(self.ttl, now) {
				return Some(entry.value.clone());
			}
		}

		// Stale entry: drop it so the map does not accumulate dead weight.
		self.entries.write().remove(key);

		None
	}

	/// Convenience wrapper over [`get_at`](Self::get_at) using the current clock.
	pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
		self.get_at(key, OffsetDateTime::now_utc())
	}

	/// Stores a value with an explicit storage instant, replacing any prior entry wholesale.
	pub fn set_at(&self, key: CacheKey, value: CachedResponse, now: OffsetDateTime) {
		self.entries.write().insert(key, CacheEntry { value, stored_at: now });
	}

	/// Convenience wrapper over [`set_at`](Self::set_at) using the current clock.
	pub fn set(&self, key: CacheKey, value: CachedResponse) {
		self.set_at(key, value, OffsetDateTime::now_utc());
	}

	/// Removes a single entry.
	pub fn invalidate(&self, key: &CacheKey) {
		self.entries.write().remove(key);
	}

	/// Removes every entry (logout, tests).
	pub fn clear(&self) {
		self.entries.write().clear();
	}
}
impl Default for ResponseCache {
	fn default() -> Self {
		Self::new(DEFAULT_TTL)
	}
}

// Length-framed so no (key, value) byte sequence can collide with a differently split one.
fn fingerprint_params(params: &BTreeMap<String, String>) -> String {
	let mut hasher = Sha256::new();

	for (key, value) in params {
		hasher.update((key.len() as u64).to_le_bytes());
		hasher.update(key.as_bytes());
		hasher.update((value.len() as u64).to_le_bytes());
		hasher.update(value.as_bytes());
	}

	STANDARD_NO_PAD.encode(hasher.finalize())
}
