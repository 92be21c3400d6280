//! Session refresh orchestration with a single-flight guard.
//!
//! The coordinator guarantees that for any number of concurrent callers observing a stale
//! session in an overlapping window, exactly one network call reaches the refresh endpoint.
//! Without that guarantee the server's single-use rotation would accept the first replayed
//! token and reject every other caller with "invalid refresh token", stranding N-1 of them.
//!
//! The guard is an async mutex plus post-acquisition revalidation: the first caller through
//! performs the rotation, later callers acquire the guard after it settles, re-check the store,
//! and reuse the outcome. Dropping a waiting caller's future detaches it from the queue without
//! cancelling the in-flight refresh for everyone else.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	http::Transport,
	identity::IdentityApi,
	obs::{self, CallKind, CallOutcome, CallSpan},
	store::TokenStore,
};

/// Serializes refresh traffic for one [`TokenStore`].
pub struct RefreshCoordinator<C>
where
	C: ?Sized + Transport,
{
	store: Arc<TokenStore>,
	identity: IdentityApi<C>,
	refresh_threshold: Duration,
	guard: AsyncMutex<()>,
	metrics: Arc<RefreshMetrics>,
}
impl<C> RefreshCoordinator<C>
where
	C: ?Sized + Transport,
{
	/// Creates a coordinator over the provided store and identity client.
	pub fn new(
		store: Arc<TokenStore>,
		identity: IdentityApi<C>,
		refresh_threshold: Duration,
	) -> Self {
		Self {
			store,
			identity,
			refresh_threshold,
			guard: AsyncMutex::new(()),
			metrics: Default::default(),
		}
	}

	/// The identity client this coordinator rotates through.
	pub fn identity(&self) -> &IdentityApi<C> {
		&self.identity
	}

	/// Shared counters for refresh outcomes.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		self.metrics.clone()
	}

	/// Ensures the session is usable for an authenticated call.
	///
	/// Returns `true` when a valid, not-near-expiry access token is available (refreshing it
	/// first when needed) and `false` when the session is over and the caller must fail with
	/// an auth-expired error instead of sending anything.
	pub async fn ensure_fresh(&self) -> bool {
		self.refresh_inner(false, None).await
	}

	/// Forced variant for the 401 escalation: the server rejected `rejected_access` even though
	/// it looked valid locally, so the hot path is skipped and a rotation is performed.
	///
	/// If another caller already rotated the pair while this one waited on the guard, the newer
	/// token is reused instead of burning a second refresh token on the same incident.
	pub async fn refresh_after_rejection(&self, rejected_access: Option<String>) -> bool {
		self.refresh_inner(true, rejected_access).await
	}

	async fn refresh_inner(&self, force: bool, rejected_access: Option<String>) -> bool {
		const KIND: CallKind = CallKind::Refresh;

		self.metrics.record_attempt();

		// Hot path: nothing to do, no lock, no network call.
		if !force && self.session_is_fresh() {
			self.metrics.record_reuse();

			return true;
		}

		let span = CallSpan::new(KIND, "refresh_inner");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let refreshed = span
			.instrument(async {
				let _singleflight = self.guard.lock().await;

				// Revalidate: a concurrent caller may have settled the refresh while this one
				// waited on the guard.
				if !force && self.session_is_fresh() {
					self.metrics.record_reuse();

					return true;
				}
				if force && self.rotation_already_settled(rejected_access.as_deref()) {
					self.metrics.record_reuse();

					return true;
				}

				let Some(refresh_token) = self.store.refresh_token() else {
					// No rotation credential at all: settle false without a network call.
					self.metrics.record_failure();

					return false;
				};

				match self.identity.refresh(refresh_token.expose()).await {
					Ok(pair) => {
						self.store.set_tokens(pair);
						self.metrics.record_refresh();

						true
					},
					Err(_) => {
						// A 401 here is authoritative (token already rotated or revoked) and a
						// network fault is indistinguishable from the caller's perspective:
						// either way the session cannot be proven alive, so it ends.
						self.store.clear();
						self.metrics.record_failure();

						false
					},
				}
			})
			.await;

		if refreshed {
			obs::record_call_outcome(KIND, CallOutcome::Success);
		} else {
			obs::record_call_outcome(KIND, CallOutcome::Failure);
		}

		refreshed
	}

	fn session_is_fresh(&self) -> bool {
		let now = OffsetDateTime::now_utc();

		self.store.is_valid_at(now) && !self.store.needs_refresh_at(self.refresh_threshold, now)
	}

	// A forced caller can stand down when the stored token already differs from the rejected
	// one: some concurrent caller rotated the pair for the same incident.
	fn rotation_already_settled(&self, rejected: Option<&str>) -> bool {
		let Some(rejected) = rejected else {
			return false;
		};
		let Some(current) = self.store.access_token() else {
			return false;
		};

		!current.matches(rejected) && self.store.is_valid()
	}
}
impl<C> Debug for RefreshCoordinator<C>
where
	C: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("identity", &self.identity)
			.field("refresh_threshold", &self.refresh_threshold)
			.finish()
	}
}
