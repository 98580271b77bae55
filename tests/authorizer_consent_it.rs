#![cfg(feature = "reqwest")]

mod common;

// std
use std::collections::HashMap;
// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use common::*;
use delegated_auth_bridge::{
	auth::ServiceId,
	error::Error,
	flows::{ConsentReason, ConsentRequest, TokenGrant},
	store::CredentialStore,
};

fn consent_of(grant: TokenGrant) -> ConsentRequest {
	match grant {
		TokenGrant::ConsentRequired(request) => request,
		TokenGrant::Ready(token) => panic!("Expected a consent request, got {token:?}."),
	}
}

#[tokio::test]
async fn missing_credential_starts_consent_with_a_complete_url() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");
	let first = consent_of(
		authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed."),
	);
	let second = consent_of(
		authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed."),
	);
	let pairs: HashMap<_, _> = first.authorization_url.query_pairs().into_owned().collect();

	assert_eq!(first.reason, ConsentReason::NoCredential);
	assert_eq!(first.authorization_url.path(), "/authorize");
	assert_eq!(pairs.get("response_type"), Some(&"code".to_owned()));
	assert_eq!(pairs.get("client_id"), Some(&CLIENT_ID.to_owned()));
	assert_eq!(pairs.get("redirect_uri"), Some(&REDIRECT_URI.to_owned()));
	assert_eq!(
		pairs.get("scope"),
		Some(&"offline_access read:confluence-content.all".to_owned())
	);
	assert_eq!(pairs.get("state"), Some(&first.state));
	assert_eq!(pairs.get("code_challenge_method"), Some(&"S256".to_owned()));
	assert!(pairs.contains_key("code_challenge"));
	assert_eq!(pairs.get("audience"), Some(&"api.atlassian.com".to_owned()));
	assert_eq!(pairs.get("prompt"), Some(&"consent".to_owned()));
	assert_ne!(first.state, second.state);
	assert_eq!(store.pending_count(), 2);
	assert_eq!(store.credential_count(), 0);
}

#[tokio::test]
async fn completing_consent_stores_exactly_one_credential() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");
	let request = consent_of(
		authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed."),
	);
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("grant_type=authorization_code")
				.body_includes("code=auth-code-1")
				.body_includes("code_verifier=")
				.body_includes("client_secret=secret-it");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-1", Some("refresh-1"), 3600));
		})
		.await;
	let token = authorizer
		.complete_consent(&request.state, "auth-code-1")
		.await
		.expect("Consent completion should succeed.");

	assert_eq!(token.secret.expose(), "access-1");
	assert_eq!(store.credential_count(), 1);

	let stored = store
		.fetch(&key(&alice))
		.await
		.expect("Store fetch should succeed.")
		.expect("Credential should be stored.");

	assert_eq!(stored.version, 1);
	assert_eq!(stored.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-1"));

	// A live credential is served without touching the token endpoint again.
	let again = authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed.");

	assert_eq!(again.access_token().map(|token| token.secret.expose()), Some("access-1"));

	exchange.assert_calls_async(1).await;
}

#[tokio::test]
async fn replaying_a_completed_state_fails_with_exchange_failed() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");
	let request = consent_of(
		authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed."),
	);
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-1", Some("refresh-1"), 3600));
		})
		.await;

	authorizer.complete_consent(&request.state, "auth-code-1").await.expect("First completion should succeed.");

	let err = authorizer
		.complete_consent(&request.state, "auth-code-1")
		.await
		.expect_err("Replay should be rejected.");

	assert!(matches!(err, Error::ExchangeFailed { .. }), "unexpected error: {err:?}");
	assert_eq!(store.credential_count(), 1);

	exchange.assert_calls_async(1).await;
}

#[tokio::test]
async fn expired_consent_cannot_be_completed_and_writes_nothing() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let authorizer = authorizer.with_consent_ttl(Duration::ZERO);
	let alice = principal("alice");
	let request = consent_of(
		authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed."),
	);
	let exchange = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-late", None, 3600));
		})
		.await;
	let err = authorizer
		.complete_consent(&request.state, "auth-code-late")
		.await
		.expect_err("Expired consent should be rejected.");

	assert!(matches!(err, Error::ConsentExpired), "unexpected error: {err:?}");
	assert_eq!(store.credential_count(), 0);
	assert_eq!(store.pending_count(), 0);

	exchange.assert_calls_async(0).await;
}

#[tokio::test]
async fn unknown_state_is_reported_as_expired() {
	let server = MockServer::start_async().await;
	let (authorizer, _store) = build_authorizer(descriptor(&server));
	let err = authorizer
		.complete_consent("never-issued", "code")
		.await
		.expect_err("Unknown state should be rejected.");

	assert!(matches!(err, Error::ConsentExpired), "unexpected error: {err:?}");
}

#[tokio::test]
async fn rejected_code_fails_with_exchange_failed() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let alice = principal("alice");
	let request = consent_of(
		authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed."),
	);

	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"code expired\"}");
		})
		.await;

	let err = authorizer
		.complete_consent(&request.state, "stale-code")
		.await
		.expect_err("Rejected code should fail.");

	assert!(matches!(err, Error::ExchangeFailed { .. }), "unexpected error: {err:?}");
	assert!(err.requires_consent());
	assert_eq!(store.credential_count(), 0);
}

#[tokio::test]
async fn unregistered_services_are_rejected() {
	let server = MockServer::start_async().await;
	let (authorizer, _store) = build_authorizer(descriptor(&server));
	let github = ServiceId::new("github").expect("Service identifier should be valid.");
	let err = authorizer
		.get_token(&principal("alice"), &github)
		.await
		.expect_err("Unregistered service should fail.");

	assert!(matches!(err, Error::UnknownService { service } if service == github));
}

#[tokio::test]
async fn purge_drops_timed_out_pending_consents() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let authorizer = authorizer.with_consent_ttl(Duration::ZERO);

	authorizer.get_token(&principal("alice"), &service_id()).await.expect("get_token should succeed.");

	assert_eq!(store.pending_count(), 1);
	assert_eq!(authorizer.purge_expired_consents().await.expect("Purge should succeed."), 1);
	assert_eq!(store.pending_count(), 0);
}

#[tokio::test]
async fn abandoned_consents_do_not_accumulate() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));
	let authorizer = authorizer.with_consent_ttl(Duration::ZERO);
	let alice = principal("alice");

	for _ in 0..50 {
		authorizer.get_token(&alice, &service_id()).await.expect("get_token should succeed.");
	}

	// Only the prompt issued last is still stored; every earlier one had timed out.
	assert_eq!(store.pending_count(), 1);
}

#[tokio::test]
async fn live_consents_survive_new_prompts() {
	let server = MockServer::start_async().await;
	let (authorizer, store) = build_authorizer(descriptor(&server));

	authorizer.get_token(&principal("alice"), &service_id()).await.expect("get_token should succeed.");
	authorizer.get_token(&principal("bob"), &service_id()).await.expect("get_token should succeed.");

	assert_eq!(store.pending_count(), 2);
}
