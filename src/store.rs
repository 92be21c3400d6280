//! In-memory session store answering validity, expiry, and refresh-needed queries.

// self
use crate::{
	_prelude::*,
	auth::{AccessClaims, TokenPair, TokenSecret},
};

#[derive(Debug, Default)]
struct SessionState {
	access: Option<TokenSecret>,
	refresh: Option<TokenSecret>,
}

/// Holds the current access/refresh pair and decodes claims on demand.
///
/// The store is the sole owner of credential material: pairs are replaced wholesale by
/// [`set_tokens`](Self::set_tokens) and dropped by [`clear`](Self::clear). Every query method is
/// a total function; a malformed or undecodable access token reads as invalid instead of
/// propagating an error.
#[derive(Debug, Default)]
pub struct TokenStore(RwLock<SessionState>);
impl TokenStore {
	/// Replaces the session with a freshly granted pair.
	pub fn set_tokens(&self, pair: TokenPair) {
		*self.0.write() =
			SessionState { access: Some(pair.access), refresh: Some(pair.refresh) };
	}

	/// Seeds a refresh-only session, e.g. when an access token was discarded but the rotation
	/// credential survived.
	pub fn seed_refresh_token(&self, refresh: impl Into<String>) {
		let mut state = self.0.write();

		state.access = None;
		state.refresh = Some(TokenSecret::new(refresh));
	}

	/// Removes the current pair (logout).
	pub fn clear(&self) {
		*self.0.write() = SessionState::default();
	}

	/// Returns the current access token, if any.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.0.read().access.clone()
	}

	/// Returns the current refresh token, if any.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.0.read().refresh.clone()
	}

	/// Decodes the current access token's claims; `None` when absent or undecodable.
	pub fn claims(&self) -> Option<AccessClaims> {
		let state = self.0.read();
		let access = state.access.as_ref()?;

		AccessClaims::decode(access.expose()).ok()
	}

	/// Subject identifier from the decoded claims, used to scope per-user state.
	pub fn subject_id(&self) -> Option<String> {
		self.claims().map(|claims| claims.user_id)
	}

	/// Returns `true` when a decodable, unexpired access token is present at `now`.
	pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
		self.claims().map(|claims| claims.is_live_at(now)).unwrap_or(false)
	}

	/// Convenience wrapper over [`is_valid_at`](Self::is_valid_at) using the current clock.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` when a refresh should happen before the next authenticated call.
	///
	/// Either the token is valid but its remaining lifetime at `now` is below `threshold`, or
	/// no access token is present while a refresh token is still cached.
	pub fn needs_refresh_at(&self, threshold: Duration, now: OffsetDateTime) -> bool {
		{
			let state = self.0.read();

			if state.access.is_none() {
				return state.refresh.is_some();
			}
		}

		match self.claims().and_then(|claims| claims.remaining_at(now)) {
			Some(remaining) => remaining < threshold,
			None => false,
		}
	}

	/// Convenience wrapper over [`needs_refresh_at`](Self::needs_refresh_at) using the current
	/// clock.
	pub fn needs_refresh(&self, threshold: Duration) -> bool {
		self.needs_refresh_at(threshold, OffsetDateTime::now_utc())
	}
}
