//! Crate-level error taxonomy shared across the engine, coordinator, and identity client.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classified failure surfaced as a value at the `execute` boundary.
///
/// Every terminal outcome resolves into exactly one of these variants so callers branch on a
/// single taxonomy instead of catching exceptions. [`Error::AuthExpired`] is the only variant
/// that clears the session; all others leave it untouched.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration or request construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Connection-level failure that exhausted its retry budget.
	#[error("Network transport failed after {attempts} attempt(s).")]
	Network {
		/// Number of sends performed before giving up.
		attempts: u32,
		/// Last transport failure observed.
		#[source]
		source: TransportError,
	},
	/// Upstream kept answering 5xx until the retry budget ran out.
	#[error("Upstream returned {status} after {attempts} attempt(s): {message}.")]
	Server {
		/// HTTP status code of the final response.
		status: u16,
		/// Number of sends performed before giving up.
		attempts: u32,
		/// Message extracted from the final response body.
		message: String,
	},
	/// Upstream rate limited the call on every attempt.
	#[error("Upstream rate limited the call.")]
	RateLimited {
		/// Retry-After hint from the final response, if supplied.
		retry_after: Option<Duration>,
	},
	/// The session could not be refreshed or the 401 escalation was exhausted; the caller must
	/// re-authenticate.
	#[error("Session expired and re-authentication is required.")]
	AuthExpired,
	/// Non-retryable rejection (4xx other than 401/429), surfaced as-is.
	#[error("Upstream rejected the call with {status}: {message}.")]
	Client {
		/// HTTP status code of the rejection.
		status: u16,
		/// Message extracted from the response body.
		message: String,
	},
	/// A success response carried a body that is not valid JSON.
	#[error("Upstream returned a malformed JSON body (status {status}).")]
	Decode {
		/// HTTP status code of the malformed response.
		status: u16,
		/// Structured parsing failure with the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Returns `true` when the failure forces the caller back through authentication.
	pub fn requires_reauthentication(&self) -> bool {
		matches!(self, Self::AuthExpired)
	}
}

/// Configuration and request construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The API origin environment value is absent.
	#[error("API origin is not configured; set `{var}`.")]
	MissingOrigin {
		/// Environment variable consulted at startup.
		var: &'static str,
	},
	/// The API origin is not a valid URL.
	#[error("API origin is not a valid URL.")]
	InvalidOrigin {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A request path cannot be joined onto the configured origin.
	#[error("Request path cannot be joined onto the origin.")]
	InvalidPath {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A request body cannot be serialized to JSON.
	#[error("Request body cannot be serialized to JSON.")]
	SerializeBody {
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (DNS, TCP, TLS, IO) raised before an HTTP status exists.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
