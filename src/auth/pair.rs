//! Token pair and the redacting secret wrapper it is built from.

// self
use crate::_prelude::*;

/// Redacted token wrapper keeping credential material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Constant-shape comparison against a raw string without exposing the secret at the call
	/// site.
	pub fn matches(&self, other: &str) -> bool {
		self.0 == other
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Access/refresh pair granted by the Identity Service at login, signup, and every refresh.
///
/// Pairs are immutable and replaced wholesale: a refresh burns the previous refresh token on
/// the server, and the previous access token simply ages out, so nothing here is ever patched
/// in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Short-lived JWT presented as a Bearer credential.
	pub access: TokenSecret,
	/// Single-use rotation credential mirrored by the Identity Service.
	pub refresh: TokenSecret,
	/// Advisory lifetime from the grant response; expiry arithmetic uses the JWT `exp` claim.
	pub expires_in: Option<Duration>,
}
impl TokenPair {
	/// Creates a pair from raw token strings.
	pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
		Self {
			access: TokenSecret::new(access),
			refresh: TokenSecret::new(refresh),
			expires_in: None,
		}
	}

	/// Attaches the advisory `expiresIn` value from the grant response.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_in = Some(expires_in);

		self
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access", &"<redacted>")
			.field("refresh", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.finish()
	}
}
