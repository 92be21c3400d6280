#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::Duration;
// self
use common::*;
use request_broker::engine::ApiRequest;

#[tokio::test]
async fn repeated_get_within_ttl_sends_once() {
	let server = MockServer::start_async().await;
	let engine = build_engine(&server.base_url());

	seed_session(&engine, "user-cache", Duration::hours(1));

	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/users/123");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"id": 123, "name": "Ada"}));
		})
		.await;
	let first = engine
		.execute(ApiRequest::get("/users/123"))
		.await
		.expect("First read should succeed.");
	let second = engine
		.execute(ApiRequest::get("/users/123"))
		.await
		.expect("Second read should be served from cache.");

	mock.assert_calls_async(1).await;

	assert!(!first.from_cache);
	assert!(second.from_cache);
	assert_eq!(first.data, second.data);
	assert_eq!(second.data, json!({"id": 123, "name": "Ada"}));
}

#[tokio::test]
async fn expired_entry_triggers_a_new_send() {
	let server = MockServer::start_async().await;
	let engine = build_engine_with(
		engine_config(&server.base_url()).with_cache_ttl(Duration::milliseconds(80)),
	);

	seed_session(&engine, "user-expiry", Duration::hours(1));

	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports/latest");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"rows": 3}));
		})
		.await;

	engine
		.execute(ApiRequest::get("/reports/latest"))
		.await
		.expect("Initial read should succeed.");
	tokio::time::sleep(std::time::Duration::from_millis(150)).await;
	engine
		.execute(ApiRequest::get("/reports/latest"))
		.await
		.expect("Post-expiry read should succeed.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn mutation_then_bypass_reflects_the_update() {
	let server = MockServer::start_async().await;
	let engine = build_engine(&server.base_url());

	seed_session(&engine, "user-mutate", Duration::hours(1));

	let mut stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/users/123");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"id": 123, "name": "Ada"}));
		})
		.await;
	let before = engine
		.execute(ApiRequest::get("/users/123"))
		.await
		.expect("Read before the mutation should succeed.");

	assert_eq!(before.data, json!({"id": 123, "name": "Ada"}));

	let update = server
		.mock_async(|when, then| {
			when.method(PUT).path("/users/123");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"id": 123, "name": "Grace"}));
		})
		.await;

	engine
		.execute(ApiRequest::put("/users/123", json!({"name": "Grace"})))
		.await
		.expect("Mutation should succeed.");
	update.assert_async().await;

	// The server now serves the updated document.
	stale.delete_async().await;

	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/users/123");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"id": 123, "name": "Grace"}));
		})
		.await;

	// Writes do not invalidate related read keys: a plain re-read legitimately serves the
	// stale cached document without touching the network.
	let cached = engine
		.execute(ApiRequest::get("/users/123"))
		.await
		.expect("Cached read should succeed.");

	assert!(cached.from_cache);
	assert_eq!(cached.data, json!({"id": 123, "name": "Ada"}));
	fresh.assert_calls_async(0).await;

	// An explicit bypass observes the mutation.
	let bypassed = engine
		.execute(ApiRequest::get("/users/123").bypass_cache())
		.await
		.expect("Bypassed read should succeed.");

	assert!(!bypassed.from_cache);
	assert_eq!(bypassed.data, json!({"id": 123, "name": "Grace"}));
	fresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn writes_are_uncached_unless_opted_in() {
	let server = MockServer::start_async().await;
	let engine = build_engine(&server.base_url());

	seed_session(&engine, "user-writes", Duration::hours(1));

	let plain = server
		.mock_async(|when, then| {
			when.method(POST).path("/searches");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"results": []}));
		})
		.await;

	for _ in 0..2 {
		engine
			.execute(ApiRequest::post("/searches", json!({"q": "ada"})))
			.await
			.expect("Plain POST should succeed.");
	}

	plain.assert_calls_async(2).await;

	let opted = server
		.mock_async(|when, then| {
			when.method(POST).path("/expensive-searches");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"results": [1, 2]}));
		})
		.await;

	for _ in 0..2 {
		engine
			.execute(ApiRequest::post("/expensive-searches", json!({"q": "ada"})).cached())
			.await
			.expect("Opted-in POST should succeed.");
	}

	opted.assert_calls_async(1).await;
}

#[tokio::test]
async fn cache_keys_fold_param_order_but_not_param_values() {
	let server = MockServer::start_async().await;
	let engine = build_engine(&server.base_url());

	seed_session(&engine, "user-params", Duration::hours(1));

	let page_two = server
		.mock_async(|when, then| {
			when.method(GET).path("/items").query_param("page", "2").query_param("sort", "name");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"page": 2}));
		})
		.await;
	let page_three = server
		.mock_async(|when, then| {
			when.method(GET).path("/items").query_param("page", "3").query_param("sort", "name");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"page": 3}));
		})
		.await;

	// Same parameters added in a different order resolve to the same cache entry.
	engine
		.execute(ApiRequest::get("/items").with_param("page", "2").with_param("sort", "name"))
		.await
		.expect("First parameterized read should succeed.");
	engine
		.execute(ApiRequest::get("/items").with_param("sort", "name").with_param("page", "2"))
		.await
		.expect("Reordered read should be served from cache.");

	page_two.assert_calls_async(1).await;

	// A different value is a different key.
	let other = engine
		.execute(ApiRequest::get("/items").with_param("page", "3").with_param("sort", "name"))
		.await
		.expect("Read with different parameters should succeed.");

	assert_eq!(other.data, json!({"page": 3}));
	page_three.assert_calls_async(1).await;
}

#[tokio::test]
async fn logout_drops_cached_reads() {
	let server = MockServer::start_async().await;
	let engine = build_engine(&server.base_url());

	seed_session(&engine, "user-logout", Duration::hours(1));

	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/profile");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({"id": "user-logout"}));
		})
		.await;

	engine.execute(ApiRequest::get("/profile")).await.expect("Read should succeed.");
	engine.logout();

	assert!(engine.store().access_token().is_none());

	// A fresh session must not observe the previous user's cached data.
	seed_session(&engine, "user-next", Duration::hours(1));
	engine.execute(ApiRequest::get("/profile")).await.expect("Re-read should succeed.");

	mock.assert_calls_async(2).await;
}
