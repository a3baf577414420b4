#![cfg(feature = "reqwest")]

// std
use std::{sync::Arc, time::Duration};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use session_broker::{
	auth::Session,
	client::ReqwestAuthenticatedClient,
	config::ClientConfig,
	error::{Error, RefreshError, RefreshFailure},
	http::ApiRequest,
	store::{MemorySessionStore, SessionStore},
};

fn session(access: &str, refresh: Option<&str>) -> Session {
	let builder = Session::builder().access_token(access);
	let builder = match refresh {
		Some(refresh) => builder.refresh_token(refresh),
		None => builder,
	};

	builder.build().expect("Session fixture should build successfully.")
}

fn build_client(
	server: &MockServer,
	session: Option<Session>,
) -> (ReqwestAuthenticatedClient, Arc<MemorySessionStore>) {
	let config = ClientConfig::builder(server.url("/api"))
		.build()
		.expect("Mock server base URL should be valid.");
	let store = Arc::new(MemorySessionStore::with_session(session));
	let client = ReqwestAuthenticatedClient::new(config, store.clone());

	(client, store)
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() {
	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/aduanas").header("authorization", "Bearer A1");
			then.status(401).json_body(json!({ "error": "Token expirado" }));
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/aduanas").header("authorization", "Bearer A2");
			then.status(200).json_body(json!({ "items": [1, 2] }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/auth/refresh")
				.json_body(json!({ "refresh_token": "R1" }));
			then.status(200)
				.delay(Duration::from_millis(200))
				.json_body(json!({ "access_token": "A2", "refresh_token": "R2" }));
		})
		.await;
	let (client, store) = build_client(&server, Some(session("A1", Some("R1"))));
	let calls = (0..5)
		.map(|_| {
			let client = client.clone();

			tokio::spawn(async move { client.request(ApiRequest::get("aduanas")).await })
		})
		.collect::<Vec<_>>();

	for call in calls {
		let response = call
			.await
			.expect("Request task should not panic.")
			.expect("Request should succeed after the shared refresh.");

		assert_eq!(response.status, 200);
	}

	refresh.assert_calls_async(1).await;
	stale.assert_calls_async(5).await;
	fresh.assert_calls_async(5).await;

	let stored = store.get().expect("Refreshed session should remain stored.");

	assert_eq!(stored.access_token.expose(), "A2");
	assert_eq!(stored.refresh_token.as_ref().map(|token| token.expose()), Some("R2"));
	assert_eq!(client.coordinator().metrics().exchanges(), 1);
	assert!(!client.coordinator().is_refreshing());
	assert_eq!(client.coordinator().queued(), 0);
}

#[tokio::test]
async fn rejected_refresh_fails_every_waiter_and_clears_the_session() {
	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/carriers");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(400)
				.delay(Duration::from_millis(300))
				.json_body(json!({ "error": "Refresh token invalido" }));
		})
		.await;
	let (client, store) = build_client(&server, Some(session("A1", Some("R1"))));
	let calls = (0..3)
		.map(|_| {
			let client = client.clone();

			tokio::spawn(async move { client.request(ApiRequest::get("carriers")).await })
		})
		.collect::<Vec<_>>();

	for call in calls {
		let err = call
			.await
			.expect("Request task should not panic.")
			.expect_err("Request should fail once the refresh is rejected.");

		assert!(err.is_session_ended());
		assert!(matches!(
			err,
			Error::Refresh(RefreshError::Failed(RefreshFailure::Rejected { status: 400, ref message }))
				if message == "Refresh token invalido"
		));
	}

	refresh.assert_calls_async(1).await;
	stale.assert_calls_async(3).await;
	assert!(store.get().is_none(), "A rejected refresh should clear the stored session.");
	assert!(!client.is_logged_in());
}

#[tokio::test]
async fn missing_refresh_token_fails_without_network_refresh() {
	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/aduanas");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200).json_body(json!({ "access_token": "A2" }));
		})
		.await;
	let (client, store) = build_client(&server, Some(session("A1", None)));
	let err = client
		.request(ApiRequest::get("aduanas"))
		.await
		.expect_err("Request should fail when no refresh token is stored.");

	assert!(matches!(err, Error::Refresh(RefreshError::NoRefreshToken)));
	stale.assert_async().await;
	refresh.assert_calls_async(0).await;
	assert!(store.get().is_none(), "An unrenewable session should be cleared.");
}

#[tokio::test]
async fn replayed_request_is_never_refreshed_twice() {
	let server = MockServer::start_async().await;
	let denied = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/carriers/7");
			then.status(401).json_body(json!({ "error": "No autorizado" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200).json_body(json!({ "access_token": "A2", "refresh_token": "R2" }));
		})
		.await;
	let (client, store) = build_client(&server, Some(session("A1", Some("R1"))));
	let response = client
		.request(ApiRequest::delete("carriers/7"))
		.await
		.expect("Second authorization failure should be returned as a response.");

	assert_eq!(response.status, 401);
	assert_eq!(response.error_message(), "No autorizado");
	denied.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;

	let stored = store.get().expect("Session should survive a replayed 401.");

	assert_eq!(stored.access_token.expose(), "A2");
}

#[tokio::test]
async fn other_failures_pass_through_without_refresh() {
	let server = MockServer::start_async().await;
	let forbidden = server
		.mock_async(|when, then| {
			when.method(PUT).path("/api/carriers/7").header("authorization", "Bearer A1");
			then.status(403).json_body(json!({ "error": "Sin permisos" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200).json_body(json!({ "access_token": "A2" }));
		})
		.await;
	let (client, store) = build_client(&server, Some(session("A1", Some("R1"))));
	let response = client
		.request(ApiRequest::put("carriers/7"))
		.await
		.expect("Non-authorization failures should be returned as responses.");

	assert_eq!(response.status, 403);
	forbidden.assert_async().await;
	refresh.assert_calls_async(0).await;
	assert_eq!(
		store.get().map(|session| session.access_token.expose().to_owned()),
		Some("A1".to_owned())
	);

	let err = client
		.fetch(ApiRequest::put("carriers/7"))
		.await
		.expect_err("fetch should surface non-2xx statuses as errors.");

	assert!(matches!(err, Error::Status { status: 403, ref message } if message == "Sin permisos"));
}

#[tokio::test]
async fn typed_helpers_send_and_decode_json() {
	#[derive(Debug, serde::Deserialize, PartialEq)]
	struct Carrier {
		id: u32,
		name: String,
	}

	let server = MockServer::start_async().await;
	let create = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/carriers")
				.header("authorization", "Bearer A1")
				.json_body(json!({ "name": "DHL" }));
			then.status(201).json_body(json!({ "id": 7, "name": "DHL" }));
		})
		.await;
	let (client, _store) = build_client(&server, Some(session("A1", Some("R1"))));
	let carrier: Carrier = client
		.send_json(session_broker::http::Method::Post, "/carriers", &json!({ "name": "DHL" }))
		.await
		.expect("Carrier creation should succeed.");

	assert_eq!(carrier, Carrier { id: 7, name: "DHL".into() });
	create.assert_async().await;
}

#[tokio::test]
async fn request_timeout_is_reported_as_timeout() {
	let server = MockServer::start_async().await;
	let _slow = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/reports");
			then.status(200).delay(Duration::from_millis(500));
		})
		.await;
	let config = ClientConfig::builder(server.url("/api"))
		.request_timeout(Duration::from_millis(50))
		.build()
		.expect("Timeout configuration should be valid.");
	let store = Arc::new(MemorySessionStore::with_session(Some(session("A1", Some("R1")))));
	let client = ReqwestAuthenticatedClient::new(config, store);
	let err = client
		.request(ApiRequest::get("reports"))
		.await
		.expect_err("Slow responses should exceed the request timeout.");

	assert!(matches!(err, Error::Timeout { operation: "request", .. }));
	assert!(!err.is_session_ended());
}
