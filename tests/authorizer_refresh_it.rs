#![cfg(feature = "reqwest")]

mod common;

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use common::*;
use delegated_auth_bridge::{
	error::Error,
	flows::{ConsentReason, TokenGrant},
	store::{CredentialStore, MemoryStore},
};

#[tokio::test]
async fn live_credentials_are_served_without_network_calls() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");

	seed_credential(&store, &alice, "access-live", Some("refresh-live"), Duration::hours(1)).await;

	let token_endpoint = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(500);
		})
		.await;

	for _ in 0..3 {
		let grant = authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed.");

		assert_eq!(grant.access_token().map(|token| token.secret.expose()), Some("access-live"));
	}

	token_endpoint.assert_calls_async(0).await;
}

#[tokio::test]
async fn expired_credentials_are_refreshed_and_versioned() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");
	let seeded =
		seed_credential(&store, &alice, "access-old", Some("refresh-old"), -Duration::minutes(1)).await;
	let token_endpoint = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=refresh-old");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-new", Some("refresh-new"), 1800));
		})
		.await;
	let grant = authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed.");

	assert_eq!(grant.access_token().map(|token| token.secret.expose()), Some("access-new"));

	let stored = store
		.fetch(&key(&alice))
		.await
		.expect("Store fetch should succeed.")
		.expect("Credential should remain stored.");

	assert_eq!(stored.version, seeded + 1);
	assert_eq!(stored.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-new"));
	assert_eq!(authorizer.refresh_metrics.successes(), 1);

	token_endpoint.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");

	seed_credential(&store, &alice, "access-stale", Some("refresh-stale"), -Duration::seconds(5))
		.await;

	let token_endpoint = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-singleflight", Some("refresh-singleflight"), 3600));
		})
		.await;
	let service = service_id();
	let (first, second) =
		tokio::join!(authorizer.get_token(&alice, &service), authorizer.get_token(&alice, &service));
	let first = first.expect("First caller should succeed.");
	let second = second.expect("Second caller should succeed.");

	assert_eq!(first.access_token().map(|token| token.secret.expose()), Some("access-singleflight"));
	assert_eq!(second.access_token().map(|token| token.secret.expose()), Some("access-singleflight"));

	token_endpoint.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_refresh_token_falls_back_to_consent() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");

	seed_credential(&store, &alice, "access-revoked", Some("refresh-revoked"), -Duration::minutes(1))
		.await;

	let token_endpoint = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let grant = authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed.");

	match grant {
		TokenGrant::ConsentRequired(request) => {
			assert_eq!(request.reason, ConsentReason::RefreshRejected);
			assert_eq!(request.service, service_id());
		},
		TokenGrant::Ready(token) => panic!("Expected consent, got {token:?}."),
	}

	assert_eq!(store.credential_count(), 0);
	assert_eq!(store.pending_count(), 1);
	assert_eq!(authorizer.refresh_metrics.failures(), 1);

	token_endpoint.assert_calls_async(1).await;
}

#[tokio::test]
async fn expired_credentials_without_refresh_tokens_need_consent() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");

	seed_credential(&store, &alice, "access-gone", None, -Duration::minutes(1)).await;

	let grant = authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed.");

	assert_eq!(grant.consent().map(|request| request.reason), Some(ConsentReason::Expired));
	assert_eq!(store.credential_count(), 0);
}

#[tokio::test]
async fn transient_failures_keep_a_still_live_token() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let authorizer = authorizer.with_preemptive_window(Duration::seconds(1));
	let alice = principal("alice");

	seed_credential(&store, &alice, "access-soon", Some("refresh-soon"), Duration::milliseconds(900))
		.await;

	let token_endpoint = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(503).header("content-type", "application/json").body(
				"{\"error\":\"temporarily_unavailable\"}",
			);
		})
		.await;
	let grant = authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed.");

	assert_eq!(grant.access_token().map(|token| token.secret.expose()), Some("access-soon"));
	assert_eq!(store.credential_count(), 1);

	token_endpoint.assert_calls_async(1).await;
}

#[tokio::test]
async fn explicit_refresh_without_a_credential_fails() {
	let server = MockServer::start_async().await;
	let (authorizer, _store) = build_authorizer(descriptor(&server));
	let err = authorizer
		.refresh(&principal("alice"), &service_id())
		.await
		.expect_err("Refreshing nothing should fail.");

	assert!(matches!(err, Error::RefreshFailed { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn explicit_refresh_rotates_a_live_credential() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");

	seed_credential(&store, &alice, "access-live", Some("refresh-live"), Duration::hours(1)).await;

	let token_endpoint = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-forced", None, 3600));
		})
		.await;
	let token = authorizer.refresh(&alice, &service_id()).await.expect("Refresh should succeed.");

	assert_eq!(token.secret.expose(), "access-forced");

	let stored = store
		.fetch(&key(&alice))
		.await
		.expect("Store fetch should succeed.")
		.expect("Credential should remain stored.");

	// No rotated refresh token in the response, so the old one is kept.
	assert_eq!(stored.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-live"));

	token_endpoint.assert_calls_async(1).await;
}

#[tokio::test]
async fn revoke_forces_a_new_consent() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");

	seed_credential(&store, &alice, "access-live", Some("refresh-live"), Duration::hours(1)).await;

	assert!(authorizer.revoke(&alice, &service_id()).await.expect("Revoke should succeed."));
	assert!(!authorizer.revoke(&alice, &service_id()).await.expect("Revoke should succeed."));

	let grant = authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed.");

	assert_eq!(grant.consent().map(|request| request.reason), Some(ConsentReason::NoCredential));
}

#[tokio::test]
async fn losing_the_write_race_returns_the_winning_credential() {
	let slow_server = MockServer::start_async().await;
	let fast_server = MockServer::start_async().await;
	let store = Arc::new(MemoryStore::default());
	let slow = authorizer_over(store.clone(), descriptor(&slow_server));
	let fast = authorizer_over(store.clone(), descriptor(&fast_server));
	let alice = principal("alice");
	let seeded =
		seed_credential(&store, &alice, "access-old", Some("refresh-old"), -Duration::minutes(1)).await;

	slow_server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(StdDuration::from_millis(500))
				.body(token_body("access-slow", Some("refresh-slow"), 3600));
		})
		.await;
	fast_server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-fast", Some("refresh-fast"), 3600));
		})
		.await;

	let service = service_id();
	let (from_slow, from_fast) =
		tokio::join!(slow.get_token(&alice, &service), fast.get_token(&alice, &service));

	assert_eq!(
		from_fast.expect("Fast caller should succeed.").access_token().map(|token| token.secret.expose()),
		Some("access-fast")
	);
	assert_eq!(
		from_slow.expect("Slow caller should succeed.").access_token().map(|token| token.secret.expose()),
		Some("access-fast")
	);

	let stored = store
		.fetch(&key(&alice))
		.await
		.expect("Store fetch should succeed.")
		.expect("Credential should remain stored.");

	assert_eq!(stored.version, seeded + 1);
	assert_eq!(stored.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-fast"));
}

#[tokio::test]
async fn stale_rejection_defers_to_a_concurrent_refresh() {
	let slow_server = MockServer::start_async().await;
	let fast_server = MockServer::start_async().await;
	let store = Arc::new(MemoryStore::default());
	let rejected = authorizer_over(store.clone(), descriptor(&slow_server));
	let fast = authorizer_over(store.clone(), descriptor(&fast_server));
	let alice = principal("alice");

	seed_credential(&store, &alice, "access-old", Some("refresh-old"), -Duration::minutes(1)).await;
	slow_server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(400)
				.header("content-type", "application/json")
				.delay(StdDuration::from_millis(500))
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	fast_server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-fast", Some("refresh-fast"), 3600));
		})
		.await;

	let service = service_id();
	let (from_rejected, from_fast) =
		tokio::join!(rejected.get_token(&alice, &service), fast.get_token(&alice, &service));

	assert_eq!(
		from_fast.expect("Fast caller should succeed.").access_token().map(|token| token.secret.expose()),
		Some("access-fast")
	);
	assert_eq!(
		from_rejected
			.expect("Rejected caller should succeed.")
			.access_token()
			.map(|token| token.secret.expose()),
		Some("access-fast")
	);
	assert_eq!(store.credential_count(), 1);
	assert_eq!(store.pending_count(), 0);
}

#[tokio::test]
async fn revoke_stays_local_even_with_a_revocation_endpoint() {
	let server = MockServer::start_async().await;
	let mut with_revocation = descriptor(&server);

	with_revocation.endpoints.revocation =
		Some(server.url("/oauth/revoke").parse().expect("Mock revocation endpoint should parse."));

	let (authorizer, store) = build_authorizer(with_revocation);
	let alice = principal("alice");
	let revocation = server
		.mock_async(|when, then| {
			when.path("/oauth/revoke");
			then.status(200);
		})
		.await;

	seed_credential(&store, &alice, "access-live", Some("refresh-live"), Duration::hours(1)).await;

	assert!(authorizer.revoke(&alice, &service_id()).await.expect("Revoke should succeed."));
	assert_eq!(store.credential_count(), 0);

	revocation.assert_calls_async(0).await;
}
