//! Shared fixtures for the engine integration suite.

#![allow(dead_code)]

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::json;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use request_broker::{
	auth::TokenPair,
	engine::{EngineConfig, RequestEngine},
	http::ReqwestTransport,
	retry::RetryPolicy,
};

/// Engine flavor exercised by every integration test.
pub type TestEngine = RequestEngine<ReqwestTransport>;

/// Builds an engine pointed at a mock server origin with default settings.
pub fn build_engine(origin: &str) -> TestEngine {
	build_engine_with(engine_config(origin))
}

/// Builds an engine from a caller-tuned configuration.
pub fn build_engine_with(config: EngineConfig) -> TestEngine {
	RequestEngine::new(config).expect("Failed to build reqwest engine for tests.")
}

/// Produces an engine configuration pointed at the provided origin.
pub fn engine_config(origin: &str) -> EngineConfig {
	EngineConfig::new(Url::parse(origin).expect("Test origin should parse as a URL."))
}

/// Retry constants shrunk so exhaustion tests finish in milliseconds.
pub fn fast_retry() -> RetryPolicy {
	RetryPolicy {
		max_attempts: 3,
		network_backoff_base: Duration::milliseconds(10),
		server_backoff_step: Duration::milliseconds(10),
		rate_limit_backoff: Duration::milliseconds(25),
	}
}

/// Forges an unsigned JWT whose payload decodes to the provided claims.
///
/// The broker never verifies signatures client-side, so a fabricated signature segment is
/// sufficient to drive the store and the engine.
pub fn forge_access_token(
	user_id: &str,
	issued_at: OffsetDateTime,
	expires_at: OffsetDateTime,
) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
	let claims = json!({
		"userId": user_id,
		"iat": issued_at.unix_timestamp(),
		"exp": expires_at.unix_timestamp(),
	});
	let payload = URL_SAFE_NO_PAD
		.encode(serde_json::to_vec(&claims).expect("Claims fixture should serialize to JSON."));

	format!("{header}.{payload}.forged-signature")
}

/// Forges an access token for `user_id` that stays live for `ttl` from now.
pub fn forge_live_access_token(user_id: &str, ttl: Duration) -> String {
	let now = OffsetDateTime::now_utc();

	forge_access_token(user_id, now - Duration::minutes(1), now + ttl)
}

/// Seeds the engine with a forged session and returns the (access, refresh) strings.
pub fn seed_session(engine: &TestEngine, user_id: &str, ttl: Duration) -> (String, String) {
	let access = forge_live_access_token(user_id, ttl);
	let refresh = format!("refresh-{user_id}");

	engine.store().set_tokens(TokenPair::new(access.clone(), refresh.clone()));

	(access, refresh)
}
