#![cfg(feature = "reqwest")]

mod common;

// std
use std::{
	sync::{Arc, Mutex},
	time::Instant,
};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::Duration;
// self
use common::*;
use request_broker::{
	engine::{ApiRequest, Notice, NoticeKind, Notifier},
	error::Error,
};

#[tokio::test]
async fn server_faults_retry_on_schedule_then_fail() {
	let server = MockServer::start_async().await;
	let engine = build_engine(&server.base_url());

	seed_session(&engine, "user-5xx", Duration::hours(1));

	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/flaky");
			then.status(500)
				.header("content-type", "application/json")
				.json_body(json!({"message": "upstream exploded"}));
		})
		.await;
	let started = Instant::now();
	let err = engine
		.execute(ApiRequest::get("/flaky"))
		.await
		.expect_err("Persistent 5xx should exhaust the retry budget.");
	let elapsed = started.elapsed();

	mock.assert_calls_async(3).await;

	assert!(matches!(err, Error::Server { status: 500, attempts: 3, .. }), "Got {err:?}.");
	// Two backoffs were awaited: ~100ms then ~200ms.
	assert!(elapsed >= std::time::Duration::from_millis(290), "Elapsed only {elapsed:?}.");
}

#[tokio::test]
async fn rate_limits_exhaust_with_flat_backoff() {
	let server = MockServer::start_async().await;
	let engine =
		build_engine_with(engine_config(&server.base_url()).with_retry(fast_retry()));

	seed_session(&engine, "user-429", Duration::hours(1));

	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/throttled");
			then.status(429)
				.header("content-type", "application/json")
				.json_body(json!({"message": "slow down"}));
		})
		.await;
	let err = engine
		.execute(ApiRequest::get("/throttled"))
		.await
		.expect_err("Persistent 429 should exhaust the retry budget.");

	mock.assert_calls_async(3).await;

	assert!(matches!(err, Error::RateLimited { .. }), "Got {err:?}.");
}

#[tokio::test]
async fn client_errors_fail_on_the_first_send() {
	let server = MockServer::start_async().await;
	let engine = build_engine(&server.base_url());

	seed_session(&engine, "user-404", Duration::hours(1));

	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/users/999");
			then.status(404)
				.header("content-type", "application/json")
				.json_body(json!({"message": "User not found"}));
		})
		.await;
	let err = engine
		.execute(ApiRequest::get("/users/999"))
		.await
		.expect_err("404 should be terminal.");

	mock.assert_calls_async(1).await;

	match err {
		Error::Client { status, message } => {
			assert_eq!(status, 404);
			assert_eq!(message, "User not found");
		},
		err => panic!("404 should classify as a client error, got {err:?}."),
	}
}

#[tokio::test]
async fn connection_failures_exhaust_and_classify() {
	// Bind an ephemeral port and release it again so nothing is listening there.
	let vacated = {
		let listener = std::net::TcpListener::bind("127.0.0.1:0")
			.expect("Ephemeral port should be bindable.");

		listener.local_addr().expect("Bound listener should expose its address.").port()
	};
	let engine = build_engine_with(
		engine_config(&format!("http://127.0.0.1:{vacated}/")).with_retry(fast_retry()),
	);

	seed_session(&engine, "user-conn", Duration::hours(1));

	let err = engine
		.execute(ApiRequest::get("/anything"))
		.await
		.expect_err("Connection failures should exhaust the retry budget.");

	assert!(matches!(err, Error::Network { attempts: 3, .. }), "Got {err:?}.");
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<Notice>>);
impl Notifier for RecordingNotifier {
	fn notify(&self, notice: Notice) {
		self.0.lock().expect("Notice collector should not be poisoned.").push(notice);
	}
}

#[tokio::test]
async fn settled_calls_forward_their_notices() {
	let server = MockServer::start_async().await;
	let collector = Arc::new(RecordingNotifier::default());
	let engine = build_engine(&server.base_url()).with_notifier(collector.clone());

	seed_session(&engine, "user-notice", Duration::hours(1));
	server
		.mock_async(|when, then| {
			when.method(GET).path("/ok");
			then.status(200).header("content-type", "application/json").json_body(json!({}));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/missing");
			then.status(404)
				.header("content-type", "application/json")
				.json_body(json!({"message": "gone"}));
		})
		.await;

	engine
		.execute(ApiRequest::get("/ok").with_success_notice("Saved"))
		.await
		.expect("Read should succeed.");
	engine
		.execute(ApiRequest::get("/missing").with_error_notice("Could not load"))
		.await
		.expect_err("Missing resource should fail.");
	// A settled call without a configured notice stays silent.
	engine.execute(ApiRequest::get("/ok")).await.expect("Silent read should succeed.");

	let notices = collector.0.lock().expect("Notice collector should not be poisoned.");

	assert_eq!(notices.len(), 2);
	assert_eq!(notices[0].kind, NoticeKind::Success);
	assert_eq!(notices[0].message, "Saved");
	assert_eq!(notices[1].kind, NoticeKind::Error);
	assert_eq!(notices[1].message, "Could not load");
}

#[tokio::test]
async fn second_unauthorized_after_replay_is_terminal() {
	let server = MockServer::start_async().await;
	let engine = build_engine(&server.base_url());

	seed_session(&engine, "user-401", Duration::hours(1));

	let rotated = forge_live_access_token("user-401", Duration::hours(1));
	let protected = server
		.mock_async(|when, then| {
			when.method(GET).path("/protected");
			then.status(401)
				.header("content-type", "application/json")
				.json_body(json!({"message": "Unauthorized"}));
		})
		.await;
	let refresh = server
		.mock_async(move |when, then| {
			when.method(POST).path("/auth/refresh-token");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"accessToken": rotated,
				"refreshToken": "refresh-rotated",
				"message": "Token refreshed",
			}));
		})
		.await;
	let err = engine
		.execute(ApiRequest::get("/protected"))
		.await
		.expect_err("A second 401 after the replay should be terminal.");

	// Exactly two sends: the original and the single replay. Never a third.
	protected.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;

	assert!(matches!(err, Error::AuthExpired), "Got {err:?}.");
	assert!(
		engine.store().access_token().is_none(),
		"An auth-expired outcome must clear the session.",
	);
}

#[tokio::test]
async fn successful_replay_uses_the_rotated_token() {
	let server = MockServer::start_async().await;
	let engine = build_engine(&server.base_url());
	let (original, _) = seed_session(&engine, "user-replay", Duration::hours(1));
	let rotated = forge_live_access_token("user-replay-rotated", Duration::hours(1));

	let rejected = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/protected")
				.header("authorization", format!("Bearer {original}"));
			then.status(401)
				.header("content-type", "application/json")
				.json_body(json!({"message": "Unauthorized"}));
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/protected")
				.header("authorization", format!("Bearer {rotated}"));
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"ok": true}));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh-token");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"accessToken": rotated,
				"refreshToken": "refresh-rotated",
				"message": "Token refreshed",
			}));
		})
		.await;
	let success = engine
		.execute(ApiRequest::get("/protected").bypass_cache())
		.await
		.expect("The replay should succeed with the rotated token.");

	rejected.assert_calls_async(1).await;
	accepted.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;

	assert_eq!(success.data, json!({"ok": true}));
	assert!(
		engine
			.store()
			.refresh_token()
			.expect("Rotated refresh token should be stored.")
			.matches("refresh-rotated"),
	);
}
