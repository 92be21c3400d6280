//! Pure retry classification for failed attempts.
//!
//! [`RetryPolicy::classify`] turns one attempt's outcome into a verdict: retry after a delay,
//! refresh the session and replay once, or fail with a classified error. The two details that
//! carry the most correctness weight live here: the 429-vs-5xx backoff split (rate limiting is
//! server backpressure and backs off longer and flatter than incidental faults) and the
//! one-shot 401 escalation (a second 401 after a successful refresh-and-replay is terminal, so
//! a token rejected for a non-expiry reason cannot loop forever).

// self
use crate::{_prelude::*, error::TransportError};

/// Ephemeral per-call attempt state; lives only for one `execute` and is never persisted.
#[derive(Clone, Debug)]
pub struct RequestAttempt {
	/// 1-based count of network sends, including the one being classified.
	pub number: u32,
	/// Whether this call already replayed once after a refresh.
	pub replayed: bool,
}
impl RequestAttempt {
	/// State for the first send.
	pub fn first() -> Self {
		Self { number: 1, replayed: false }
	}

	/// Advances to the next send.
	pub fn bump(&mut self) {
		self.number = self.number.saturating_add(1);
	}

	/// Records that the refresh-and-replay escalation has been spent.
	pub fn mark_replayed(&mut self) {
		self.replayed = true;
	}
}

/// Everything the classifier needs to know about a failed attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
	/// Connection-level failure; no HTTP status was produced.
	Network {
		/// The transport failure.
		error: TransportError,
	},
	/// HTTP response with a non-success status.
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Message extracted from the response body.
		message: String,
		/// Relative `Retry-After` hint, if the server supplied one.
		retry_after: Option<Duration>,
	},
}

/// Verdict for one classified attempt.
#[derive(Debug)]
pub enum RetryVerdict {
	/// Resend the same request after the delay, with the same token.
	Retry {
		/// Backoff to await before the next send.
		delay: Duration,
	},
	/// Refresh the session, then resend exactly once.
	RefreshAndReplay,
	/// Stop with the classified terminal error.
	Fail(Error),
}

/// Classifier configuration; every constant is a default, not a protocol requirement.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
	/// Total sends allowed per call (replays included in the count).
	pub max_attempts: u32,
	/// First-retry delay for connection-level failures; doubles per attempt.
	pub network_backoff_base: Duration,
	/// Per-attempt delay increment for 5xx responses.
	pub server_backoff_step: Duration,
	/// Flat delay for 429 responses when the server sends no hint.
	pub rate_limit_backoff: Duration,
}
impl RetryPolicy {
	/// Applies the decision tree to one failed attempt.
	pub fn classify(&self, attempt: &RequestAttempt, outcome: AttemptOutcome) -> RetryVerdict {
		match outcome {
			AttemptOutcome::Network { error } =>
				if attempt.number < self.max_attempts {
					let factor = 2_i32.saturating_pow(attempt.number.saturating_sub(1));

					RetryVerdict::Retry { delay: self.network_backoff_base * factor }
				} else {
					RetryVerdict::Fail(Error::Network {
						attempts: attempt.number,
						source: error,
					})
				},
			AttemptOutcome::Rejected { status: 401, .. } =>
				if attempt.replayed {
					RetryVerdict::Fail(Error::AuthExpired)
				} else {
					RetryVerdict::RefreshAndReplay
				},
			AttemptOutcome::Rejected { status: 429, retry_after, .. } =>
				if attempt.number < self.max_attempts {
					RetryVerdict::Retry { delay: retry_after.unwrap_or(self.rate_limit_backoff) }
				} else {
					RetryVerdict::Fail(Error::RateLimited { retry_after })
				},
			AttemptOutcome::Rejected { status, message, .. } if status >= 500 =>
				if attempt.number < self.max_attempts {
					let factor = i32::try_from(attempt.number).unwrap_or(i32::MAX);

					RetryVerdict::Retry { delay: self.server_backoff_step * factor }
				} else {
					RetryVerdict::Fail(Error::Server {
						status,
						attempts: attempt.number,
						message,
					})
				},
			AttemptOutcome::Rejected { status, message, .. } =>
				RetryVerdict::Fail(Error::Client { status, message }),
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			network_backoff_base: Duration::milliseconds(100),
			server_backoff_step: Duration::milliseconds(100),
			rate_limit_backoff: Duration::milliseconds(1000),
		}
	}
}
