//! Client for the Identity Service endpoints that mint and rotate token pairs.
//!
//! The service is the authority on every credential decision. Three endpoints are consumed:
//! `/auth/login` and `/auth/signup` mint the initial pair, `/auth/refresh-token` rotates it.
//! Rotation is single-use on the server side: accepting a refresh token atomically invalidates
//! it and issues a successor, and replaying a consumed token is rejected with 401. A 401 from
//! the refresh endpoint therefore means the session is over, never "try again".

// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	error::ConfigError,
	http::{Method, Transport, TransportRequest, rejection_message},
};

/// Wire shape shared by every grant response.
///
/// Login and signup answer `{token, refreshToken, expiresIn, userId}`; the refresh endpoint
/// answers `{accessToken, refreshToken, message}` on some deployments and `{token, ...}` on
/// others, so both spellings are accepted. Fields the broker does not consume are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionGrant {
	#[serde(alias = "accessToken")]
	token: String,
	refresh_token: String,
	#[serde(default)]
	expires_in: Option<i64>,
}
impl SessionGrant {
	fn into_pair(self) -> TokenPair {
		let pair = TokenPair::new(self.token, self.refresh_token);

		match self.expires_in {
			Some(secs) => pair.with_expires_in(Duration::seconds(secs)),
			None => pair,
		}
	}
}

/// Thin client over the Identity Service token endpoints.
///
/// Identity calls are never retried here; the engine's retry loop covers resource calls, and
/// the refresh coordinator treats every failure of this client the same way (session over).
pub struct IdentityApi<C>
where
	C: ?Sized + Transport,
{
	transport: Arc<C>,
	origin: Url,
}
impl<C> IdentityApi<C>
where
	C: ?Sized + Transport,
{
	/// Creates a client for the provided transport + origin.
	pub fn new(transport: Arc<C>, origin: Url) -> Self {
		Self { transport, origin }
	}

	/// Exchanges credentials for a token pair.
	pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair> {
		self.grant_call("/auth/login", json_body(&[("email", email), ("password", password)]))
			.await
	}

	/// Registers an account and receives its first token pair.
	pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<TokenPair> {
		self.grant_call(
			"/auth/signup",
			json_body(&[("name", name), ("email", email), ("password", password)]),
		)
		.await
	}

	/// Exchanges a refresh token for a rotated pair, burning the one presented.
	pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
		self.grant_call("/auth/refresh-token", json_body(&[("refreshToken", refresh_token)]))
			.await
	}

	async fn grant_call(&self, path: &str, body: Value) -> Result<TokenPair> {
		let url = self
			.origin
			.join(path)
			.map_err(|source| Error::from(ConfigError::InvalidPath { source }))?;
		let body = serde_json::to_vec(&body)
			.map_err(|source| Error::from(ConfigError::SerializeBody { source }))?;
		let request = TransportRequest {
			method: Method::Post,
			url,
			headers: vec![
				("accept".to_owned(), "application/json".to_owned()),
				("content-type".to_owned(), "application/json".to_owned()),
			],
			body: Some(body),
		};
		let response = self
			.transport
			.send(request)
			.await
			.map_err(|source| Error::Network { attempts: 1, source })?;

		if !response.is_success() {
			return Err(reject(
				response.status,
				rejection_message(&response.body),
				response.retry_after,
			));
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&response.body);
		let grant: SessionGrant = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::Decode { status: response.status, source })?;

		Ok(grant.into_pair())
	}
}
impl<C> Clone for IdentityApi<C>
where
	C: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self { transport: self.transport.clone(), origin: self.origin.clone() }
	}
}
impl<C> Debug for IdentityApi<C>
where
	C: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityApi").field("origin", &self.origin.as_str()).finish()
	}
}

fn json_body(fields: &[(&str, &str)]) -> Value {
	Value::Object(
		fields.iter().map(|(key, value)| ((*key).to_owned(), Value::from(*value))).collect(),
	)
}

fn reject(status: u16, message: String, retry_after: Option<Duration>) -> Error {
	match status {
		429 => Error::RateLimited { retry_after },
		status if status >= 500 => Error::Server { status, attempts: 1, message },
		status => Error::Client { status, message },
	}
}
