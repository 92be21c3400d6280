//! Transport primitives for outbound API calls.
//!
//! The module exposes [`Transport`] alongside [`TransportRequest`] and [`TransportResponse`] so
//! downstream crates can integrate custom HTTP clients. The trait is the crate's only
//! dependency on an HTTP stack: the engine builds a fully resolved request (URL, headers,
//! serialized body) and expects back the status, a `Retry-After` hint when present, and the raw
//! body bytes. Classification and retries stay above this seam.

// std
use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// HTTP verbs recognized by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
	/// Idempotent read; the only verb cached by default.
	Get,
	/// Create or submit.
	Post,
	/// Replace.
	Put,
	/// Remove.
	Delete,
}
impl Method {
	/// Uppercase wire representation.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Delete => "DELETE",
		}
	}

	/// Returns `true` for the verbs whose responses are cacheable unless the caller opts out.
	pub const fn cacheable_by_default(self) -> bool {
		matches!(self, Method::Get)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved outbound message handed to a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportRequest {
	/// HTTP verb.
	pub method: Method,
	/// Absolute URL including query parameters.
	pub url: Url,
	/// Header name/value pairs; names are lowercase.
	pub headers: Vec<(String, String)>,
	/// Serialized JSON body, when the call carries one.
	pub body: Option<Vec<u8>>,
}

/// Raw response surfaced back to the engine for classification.
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: u16,
	/// Relative `Retry-After` hint parsed from the response headers, if supplied.
	pub retry_after: Option<Duration>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl TransportResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing one request/response exchange.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared between
/// the engine, the refresh coordinator, and the identity client behind one `Arc`. A transport
/// performs no retries, no auth handling, and no JSON parsing; it reports connection-level
/// failures as [`TransportError`] and leaves every HTTP status, including errors, to the caller.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Executes a single exchange.
	fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Redirect-following stays at reqwest's defaults; the broker targets a single origin and
/// treats any status it receives, redirects included, as data for the retry classifier.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client.request(method, request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let retry_after = parse_retry_after(response.headers());
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(TransportResponse { status, retry_after, body })
		})
	}
}

const REJECTION_PREVIEW_LIMIT: usize = 200;

/// Extracts a human-readable message from an error response body.
///
/// JSON bodies are mined for the conventional `message`/`error` fields; anything else is
/// surfaced as a truncated text preview so diagnostics never balloon past log-friendly sizes.
pub(crate) fn rejection_message(body: &[u8]) -> String {
	if let Ok(value) = serde_json::from_slice::<Value>(body) {
		for field in ["message", "error"] {
			if let Some(text) = value.get(field).and_then(Value::as_str) {
				return text.to_owned();
			}
		}
	}

	let preview = String::from_utf8_lossy(body);
	let mut preview = preview.trim().to_owned();

	if preview.is_empty() {
		return "no response body".to_owned();
	}
	if preview.len() > REJECTION_PREVIEW_LIMIT {
		let mut cut = REJECTION_PREVIEW_LIMIT;

		while !preview.is_char_boundary(cut) {
			cut -= 1;
		}

		preview.truncate(cut);
	}

	preview
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
