//! Resilient authenticated HTTP client layer: single-flight token refresh, classified retry
//! backoff, and TTL response caching in one crate built for API-facing frontends.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod engine;
pub mod error;
pub mod http;
pub mod identity;
pub mod obs;
pub mod refresh;
pub mod retry;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	use serde_json::json;
	// self
	use crate::{
		engine::{EngineConfig, RequestEngine},
		http::ReqwestTransport,
		store::TokenStore,
	};

	/// Engine type alias used by reqwest-backed integration tests.
	pub type ReqwestTestEngine = RequestEngine<ReqwestTransport>;

	/// Builds a [`RequestEngine`] pointed at a mock server origin with default settings.
	pub fn build_test_engine(origin: &str) -> ReqwestTestEngine {
		build_test_engine_with(test_engine_config(origin))
	}

	/// Builds a [`RequestEngine`] from a caller-tuned configuration.
	pub fn build_test_engine_with(config: EngineConfig) -> ReqwestTestEngine {
		RequestEngine::new(config).expect("Failed to build reqwest engine for tests.")
	}

	/// Produces an engine configuration pointed at the provided origin.
	pub fn test_engine_config(origin: &str) -> EngineConfig {
		EngineConfig::new(Url::parse(origin).expect("Test origin should parse as a URL."))
	}

	/// Forges an unsigned JWT whose payload decodes to the provided claims.
	///
	/// The broker never verifies signatures client-side, so a fabricated signature segment is
	/// sufficient for store and engine tests.
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

	/// Seeds a store with a forged session and returns the (access, refresh) strings.
	pub fn seed_session(store: &TokenStore, user_id: &str, ttl: Duration) -> (String, String) {
		let access = forge_live_access_token(user_id, ttl);
		let refresh = format!("refresh-{user_id}");

		store.set_tokens(crate::auth::TokenPair::new(access.clone(), refresh.clone()));

		(access, refresh)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::RwLock;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use {serde_json, url};
#[cfg(test)] use httpmock as _;
