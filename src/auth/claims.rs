//! Unverified JWT claims decoding for client-side expiry arithmetic.
//!
//! The broker never validates signatures; the Identity Service is the authority on token
//! acceptance. Claims are decoded purely to answer "how long does this token have left" without
//! a network round trip, so every failure here reads as "invalid token", never a panic.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

/// Errors produced while decoding an access token's payload segment.
#[derive(Debug, ThisError)]
pub enum ClaimsError {
	/// The token is not a three-segment JWT.
	#[error("Token is not a three-segment JWT.")]
	MalformedToken,
	/// The payload segment is not valid base64url.
	#[error("Token payload is not valid base64url.")]
	PayloadEncoding,
	/// The payload segment is not a valid claims document.
	#[error("Token payload is not a valid claims document.")]
	PayloadParse {
		/// Structured parsing failure with the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The expiry instant falls outside the representable time range.
	#[error("Token timestamp is outside the representable time range.")]
	TimestampOutOfRange,
}

/// Claims carried by an access token: the subject plus issue/expiry instants.
///
/// Upstream signs `{userId, iat, exp}`; `sub` is accepted as an alias for deployments that use
/// the registered claim name. Unknown fields are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
	/// Subject identifier used to scope per-user state.
	#[serde(rename = "userId", alias = "sub")]
	pub user_id: String,
	/// Issued-at instant in UNIX seconds.
	pub iat: i64,
	/// Expiry instant in UNIX seconds.
	pub exp: i64,
}
impl AccessClaims {
	/// Decodes the payload segment of a JWT without verifying its signature.
	pub fn decode(token: &str) -> Result<Self, ClaimsError> {
		let mut segments = token.split('.');
		let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
			(Some(_), Some(payload), Some(_), None) => payload,
			_ => return Err(ClaimsError::MalformedToken),
		};
		let raw = URL_SAFE_NO_PAD.decode(payload).map_err(|_| ClaimsError::PayloadEncoding)?;
		let mut deserializer = serde_json::Deserializer::from_slice(&raw);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ClaimsError::PayloadParse { source })
	}

	/// Returns the expiry instant.
	pub fn expires_at(&self) -> Result<OffsetDateTime, ClaimsError> {
		OffsetDateTime::from_unix_timestamp(self.exp)
			.map_err(|_| ClaimsError::TimestampOutOfRange)
	}

	/// Returns the issued-at instant.
	pub fn issued_at(&self) -> Result<OffsetDateTime, ClaimsError> {
		OffsetDateTime::from_unix_timestamp(self.iat)
			.map_err(|_| ClaimsError::TimestampOutOfRange)
	}

	/// Returns `true` while the token has not reached its expiry instant.
	pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at().map(|expiry| now < expiry).unwrap_or(false)
	}

	/// Remaining lifetime at `now`, or `None` once expired or undecodable.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Option<Duration> {
		let expiry = self.expires_at().ok()?;
		let remaining = expiry - now;

		remaining.is_positive().then_some(remaining)
	}
}
