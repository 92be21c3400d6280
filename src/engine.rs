//! Request orchestration: cache check, auth injection, send/classify loop, cache write.

// std
use std::env;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	cache::{self, CacheKey, CachedResponse, ResponseCache},
	error::ConfigError,
	http::{Method, Transport, TransportRequest, rejection_message},
	identity::IdentityApi,
	obs::{self, CallKind, CallOutcome, CallSpan},
	refresh::{RefreshCoordinator, RefreshMetrics},
	retry::{AttemptOutcome, RequestAttempt, RetryPolicy, RetryVerdict},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Startup configuration, read once and injected into the engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
	/// Single API origin every request path is joined onto.
	pub origin: Url,
	/// Remaining-lifetime window below which a valid token is refreshed preemptively.
	pub refresh_threshold: Duration,
	/// Freshness window for cached read responses.
	pub cache_ttl: Duration,
	/// Retry classification constants.
	pub retry: RetryPolicy,
}
impl EngineConfig {
	/// Environment variable consulted by [`from_env`](Self::from_env).
	pub const ORIGIN_VAR: &str = "API_ORIGIN";
	/// Default preemptive refresh window.
	pub const REFRESH_THRESHOLD: Duration = Duration::seconds(120);

	/// Creates a configuration with default windows and retry constants.
	pub fn new(origin: Url) -> Self {
		Self {
			origin,
			refresh_threshold: Self::REFRESH_THRESHOLD,
			cache_ttl: cache::DEFAULT_TTL,
			retry: RetryPolicy::default(),
		}
	}

	/// Reads the API origin from the environment, once, at startup.
	pub fn from_env() -> Result<Self> {
		let raw = env::var(Self::ORIGIN_VAR)
			.map_err(|_| ConfigError::MissingOrigin { var: Self::ORIGIN_VAR })?;
		let origin =
			Url::parse(&raw).map_err(|source| ConfigError::InvalidOrigin { source })?;

		Ok(Self::new(origin))
	}

	/// Overrides the preemptive refresh window.
	pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
		self.refresh_threshold = threshold;

		self
	}

	/// Overrides the cache freshness window.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}

	/// Overrides the retry constants.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}
}

/// Per-call cache participation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CacheMode {
	/// Cache GET responses, skip everything else.
	#[default]
	Default,
	/// Cache this call's response regardless of verb.
	Enabled,
	/// Neither read from nor write to the cache.
	Bypass,
}
impl CacheMode {
	/// Resolves the mode against the request verb.
	pub fn applies_to(self, method: Method) -> bool {
		match self {
			CacheMode::Default => method.cacheable_by_default(),
			CacheMode::Enabled => true,
			CacheMode::Bypass => false,
		}
	}
}

/// One logical API call, described declaratively and handed to [`RequestEngine::execute`].
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP verb.
	pub method: Method,
	/// Path joined onto the configured origin, e.g. `/users/123`.
	pub path: String,
	/// JSON body, when the call carries one.
	pub body: Option<Value>,
	/// Query parameters; ordered map so cache keys are construction-order independent.
	pub params: BTreeMap<String, String>,
	/// Extra header name/value pairs; engine-owned headers win on conflict.
	pub headers: Vec<(String, String)>,
	/// Whether a Bearer credential is injected (and refreshed first when stale).
	pub requires_auth: bool,
	/// Cache participation for this call.
	pub cache_mode: CacheMode,
	/// Message forwarded to the notification collaborator on success.
	pub success_notice: Option<String>,
	/// Message forwarded to the notification collaborator on terminal failure.
	pub error_notice: Option<String>,
}
impl ApiRequest {
	/// Creates a request with the defaults: authenticated, GET-only caching, no notices.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			body: None,
			params: BTreeMap::new(),
			headers: Vec::new(),
			requires_auth: true,
			cache_mode: CacheMode::Default,
			success_notice: None,
			error_notice: None,
		}
	}

	/// GET request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// POST request carrying a JSON body.
	pub fn post(path: impl Into<String>, body: Value) -> Self {
		Self::new(Method::Post, path).with_body(body)
	}

	/// PUT request carrying a JSON body.
	pub fn put(path: impl Into<String>, body: Value) -> Self {
		Self::new(Method::Put, path).with_body(body)
	}

	/// DELETE request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Attaches or replaces the JSON body.
	pub fn with_body(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Adds one query parameter.
	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.insert(key.into(), value.into());

		self
	}

	/// Adds one header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Marks the call as public: no Bearer injection, no refresh check.
	pub fn without_auth(mut self) -> Self {
		self.requires_auth = false;

		self
	}

	/// Opts the call into caching regardless of verb.
	pub fn cached(mut self) -> Self {
		self.cache_mode = CacheMode::Enabled;

		self
	}

	/// Opts the call out of the cache entirely (read and write).
	pub fn bypass_cache(mut self) -> Self {
		self.cache_mode = CacheMode::Bypass;

		self
	}

	/// Forwards a message to the notification collaborator on success.
	pub fn with_success_notice(mut self, message: impl Into<String>) -> Self {
		self.success_notice = Some(message.into());

		self
	}

	/// Forwards a message to the notification collaborator on terminal failure.
	pub fn with_error_notice(mut self, message: impl Into<String>) -> Self {
		self.error_notice = Some(message.into());

		self
	}

	fn cacheable(&self) -> bool {
		self.cache_mode.applies_to(self.method)
	}
}

/// Terminal success returned by [`RequestEngine::execute`].
#[derive(Clone, Debug)]
pub struct ApiSuccess {
	/// HTTP status code (the original one when served from cache).
	pub status: u16,
	/// Parsed JSON body; [`Value::Null`] for empty bodies such as 204 responses.
	pub data: Value,
	/// Whether the value was served from the response cache.
	pub from_cache: bool,
}
impl ApiSuccess {
	/// Deserializes the payload into a typed value.
	pub fn decode<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		serde_path_to_error::deserialize(&self.data)
			.map_err(|source| Error::Decode { status: self.status, source })
	}
}

/// Severity attached to a forwarded notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
	/// The call completed successfully.
	Success,
	/// The call failed terminally.
	Error,
}

/// Message forwarded to the notification collaborator after a call settles.
#[derive(Clone, Debug)]
pub struct Notice {
	/// Severity of the notice.
	pub kind: NoticeKind,
	/// Caller-supplied message text.
	pub message: String,
}

/// Out-of-scope notification collaborator; the engine only forwards, never renders.
pub trait Notifier
where
	Self: Send + Sync,
{
	/// Receives one settled-call notice.
	fn notify(&self, notice: Notice);
}

/// Orchestrates one logical call end to end: cache check, auth injection/refresh, send,
/// classification, retry/replay loop, cache write.
///
/// The engine is the only component performing resource I/O and the only writer of the response
/// cache. Every terminal outcome, success or failure, resolves as a [`Result`] value; nothing
/// escapes `execute` as a panic or unclassified error, so callers branch uniformly.
///
/// State is engine-owned rather than process-global: build one engine per origin at startup and
/// share it, or build isolated instances in tests.
pub struct RequestEngine<C>
where
	C: ?Sized + Transport,
{
	transport: Arc<C>,
	store: Arc<TokenStore>,
	cache: Arc<ResponseCache>,
	refresh: RefreshCoordinator<C>,
	origin: Url,
	retry: RetryPolicy,
	notifier: Option<Arc<dyn Notifier>>,
}
impl<C> RequestEngine<C>
where
	C: ?Sized + Transport,
{
	/// Creates an engine that reuses the caller-provided transport.
	pub fn with_transport(config: EngineConfig, transport: impl Into<Arc<C>>) -> Self {
		let transport = transport.into();
		let store = Arc::new(TokenStore::default());
		let cache = Arc::new(ResponseCache::new(config.cache_ttl));
		let identity = IdentityApi::new(transport.clone(), config.origin.clone());
		let refresh =
			RefreshCoordinator::new(store.clone(), identity, config.refresh_threshold);

		Self {
			transport,
			store,
			cache,
			refresh,
			origin: config.origin,
			retry: config.retry,
			notifier: None,
		}
	}

	/// Attaches the notification collaborator notices are forwarded to.
	pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
		self.notifier = Some(notifier);

		self
	}

	/// The session store owned by this engine.
	pub fn store(&self) -> &TokenStore {
		&self.store
	}

	/// The response cache owned by this engine.
	pub fn cache(&self) -> &ResponseCache {
		&self.cache
	}

	/// The identity client this engine authenticates through.
	pub fn identity(&self) -> &IdentityApi<C> {
		self.refresh.identity()
	}

	/// Counters describing refresh coordination outcomes.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		self.refresh.metrics()
	}

	/// Executes one logical call to completion.
	pub async fn execute(&self, request: ApiRequest) -> Result<ApiSuccess> {
		const KIND: CallKind = CallKind::Execute;

		let span = CallSpan::new(KIND, "execute");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span.instrument(self.execute_inner(&request)).await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		self.forward_notice(&request, result.is_ok());

		result
	}

	/// Exchanges credentials for a session and stores the granted pair.
	pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair> {
		self.grant_session(CallKind::Login, self.identity().login(email, password)).await
	}

	/// Registers an account and stores its first session pair.
	pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<TokenPair> {
		self.grant_session(CallKind::Signup, self.identity().signup(name, email, password)).await
	}

	/// Ends the session locally: drops the token pair and every cached response.
	pub fn logout(&self) {
		self.store.clear();
		self.cache.clear();
	}

	async fn grant_session<F>(&self, kind: CallKind, call: F) -> Result<TokenPair>
	where
		F: Future<Output = Result<TokenPair>>,
	{
		let span = CallSpan::new(kind, "grant_session");

		obs::record_call_outcome(kind, CallOutcome::Attempt);

		let result = span.instrument(call).await;

		match &result {
			Ok(pair) => {
				self.store.set_tokens(pair.clone());
				obs::record_call_outcome(kind, CallOutcome::Success);
			},
			Err(_) => obs::record_call_outcome(kind, CallOutcome::Failure),
		}

		result
	}

	async fn execute_inner(&self, request: &ApiRequest) -> Result<ApiSuccess> {
		let cacheable = request.cacheable();
		let key = CacheKey::new(request.method, &request.path, &request.params);

		let cached = if cacheable { self.cache.get(&key) } else { None };

		if let Some(hit) = cached {
			return Ok(ApiSuccess { status: hit.status, data: hit.data, from_cache: true });
		}
		if request.requires_auth && !self.refresh.ensure_fresh().await {
			return Err(self.expire_session());
		}

		let mut attempt = RequestAttempt::first();

		loop {
			let outgoing = self.prepare(request)?;
			let outcome = match self.transport.send(outgoing).await {
				Ok(response) if response.is_success() => {
					let data = parse_success_body(response.status, &response.body)?;

					if cacheable {
						self.cache.set(
							key,
							CachedResponse { status: response.status, data: data.clone() },
						);
					}

					return Ok(ApiSuccess { status: response.status, data, from_cache: false });
				},
				Ok(response) => AttemptOutcome::Rejected {
					status: response.status,
					message: rejection_message(&response.body),
					retry_after: response.retry_after,
				},
				Err(error) => AttemptOutcome::Network { error },
			};

			match self.retry.classify(&attempt, outcome) {
				RetryVerdict::Retry { delay } => {
					backoff(delay).await;
					attempt.bump();
				},
				RetryVerdict::RefreshAndReplay => {
					let rejected =
						self.store.access_token().map(|token| token.expose().to_owned());

					if !self.refresh.refresh_after_rejection(rejected).await {
						return Err(self.expire_session());
					}

					// The Bearer header is rebuilt from the store on the next iteration, so
					// the replay carries a token at least as fresh as the rejected one.
					attempt.mark_replayed();
					attempt.bump();
				},
				RetryVerdict::Fail(error) => {
					if error.requires_reauthentication() {
						return Err(self.expire_session());
					}

					return Err(error);
				},
			}
		}
	}

	// Auth-expired outcomes force re-authentication, so the stale pair must not linger and feed
	// further doomed calls. Cached reads stay; they expire on their own clock.
	fn expire_session(&self) -> Error {
		self.store.clear();

		Error::AuthExpired
	}

	fn prepare(&self, request: &ApiRequest) -> Result<TransportRequest> {
		let mut url = self
			.origin
			.join(&request.path)
			.map_err(|source| Error::from(ConfigError::InvalidPath { source }))?;

		if !request.params.is_empty() {
			let mut pairs = url.query_pairs_mut();

			for (key, value) in &request.params {
				pairs.append_pair(key, value);
			}
		}

		let mut headers: BTreeMap<String, String> = BTreeMap::new();

		headers.insert("accept".to_owned(), "application/json".to_owned());

		for (name, value) in &request.headers {
			headers.insert(name.to_ascii_lowercase(), value.clone());
		}

		let body = match &request.body {
			Some(value) => {
				headers
					.entry("content-type".to_owned())
					.or_insert_with(|| "application/json".to_owned());

				Some(
					serde_json::to_vec(value)
						.map_err(|source| Error::from(ConfigError::SerializeBody { source }))?,
				)
			},
			None => None,
		};

		let bearer = if request.requires_auth { self.store.access_token() } else { None };

		if let Some(access) = bearer {
			headers.insert("authorization".to_owned(), format!("Bearer {}", access.expose()));
		}

		Ok(TransportRequest {
			method: request.method,
			url,
			headers: headers.into_iter().collect(),
			body,
		})
	}

	fn forward_notice(&self, request: &ApiRequest, succeeded: bool) {
		let Some(notifier) = self.notifier.as_ref() else {
			return;
		};
		let notice = if succeeded {
			request
				.success_notice
				.clone()
				.map(|message| Notice { kind: NoticeKind::Success, message })
		} else {
			request
				.error_notice
				.clone()
				.map(|message| Notice { kind: NoticeKind::Error, message })
		};

		if let Some(notice) = notice {
			notifier.notify(notice);
		}
	}
}
#[cfg(feature = "reqwest")]
impl RequestEngine<ReqwestTransport> {
	/// Creates an engine with its own reqwest-backed transport.
	pub fn new(config: EngineConfig) -> Result<Self> {
		let client = ReqwestClient::builder().build().map_err(ConfigError::from)?;

		Ok(Self::with_transport(config, ReqwestTransport::with_client(client)))
	}
}
impl<C> Debug for RequestEngine<C>
where
	C: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestEngine")
			.field("origin", &self.origin.as_str())
			.field("retry", &self.retry)
			.field("notifier_set", &self.notifier.is_some())
			.finish()
	}
}

fn parse_success_body(status: u16, body: &[u8]) -> Result<Value> {
	if body.is_empty() {
		return Ok(Value::Null);
	}

	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::Decode { status, source })
}

async fn backoff(delay: Duration) {
	tokio::time::sleep(std::time::Duration::try_from(delay).unwrap_or_default()).await;
}
