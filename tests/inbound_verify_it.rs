#![cfg(feature = "reqwest")]

mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use jsonwebtoken::Algorithm;
use serde_json::json;
use time::Duration;
// self
use common::*;
use delegated_auth_bridge::{
	error::{AuthError, Error},
	inbound::{self, DiscoveryKeySource, StaticKeySet, Verifier, VerifierConfig},
	url::Url,
};

fn config() -> VerifierConfig {
	VerifierConfig::new(ISSUER, AUDIENCE)
		.with_algorithms([Algorithm::HS256])
		.with_refetch_interval(Duration::ZERO)
}

fn discovery_verifier(server: &MockServer) -> Verifier {
	let source = DiscoveryKeySource::new(
		insecure_reqwest_client(),
		Url::parse(&server.url("/.well-known/openid-configuration"))
			.expect("Discovery URL should parse."),
	);

	Verifier::new(config(), Arc::new(source)).expect("Verifier should build.")
}

#[tokio::test]
async fn discovery_and_jwks_are_fetched_once() {
	let server = MockServer::start_async().await;
	let discovery = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "issuer": ISSUER, "jwks_uri": server.url("/jwks.json") }));
		})
		.await;
	let jwks_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/jwks.json");
			then.status(200).header("content-type", "application/json").json_body(jwks(&["k1"]));
		})
		.await;
	let verifier = discovery_verifier(&server);
	let first = verifier
		.verify(&mint_bearer("user-a", "k1", json!({})))
		.await
		.expect("First token should verify.");
	let second = verifier
		.verify(&mint_bearer("user-b", "k1", json!({ "tenant": "acme" })))
		.await
		.expect("Second token should verify.");

	assert_eq!(first.subject.as_str(), "user-a");
	assert_eq!(second.subject.as_str(), "user-b");
	assert_eq!(second.claim("tenant"), Some(&json!("acme")));
	assert!(first.scopes.contains("agent/invoke"));

	discovery.assert_calls_async(1).await;
	jwks_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn unknown_key_id_refetches_the_key_set() {
	let server = MockServer::start_async().await;
	let mut jwks_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/jwks.json");
			then.status(200).header("content-type", "application/json").json_body(jwks(&["k1"]));
		})
		.await;
	let source = DiscoveryKeySource::with_jwks_uri(
		insecure_reqwest_client(),
		Url::parse(&server.url("/jwks.json")).expect("JWKS URL should parse."),
	);
	let verifier = Verifier::new(config(), Arc::new(source)).expect("Verifier should build.");

	verifier.verify(&mint_bearer("user-a", "k1", json!({}))).await.expect("k1 should verify.");
	jwks_mock.assert_calls_async(1).await;
	jwks_mock.delete_async().await;

	jwks_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/jwks.json");
			then.status(200).header("content-type", "application/json").json_body(jwks(&["k1", "k2"]));
		})
		.await;

	let rotated = verifier
		.verify(&mint_bearer("user-a", "k2", json!({})))
		.await
		.expect("A rotated key should be picked up after one refetch.");

	assert_eq!(rotated.subject.as_str(), "user-a");

	jwks_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn key_set_outage_is_transient_not_an_auth_failure() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(503).header("retry-after", "7");
		})
		.await;

	let err = discovery_verifier(&server)
		.verify(&mint_bearer("user-a", "k1", json!({})))
		.await
		.expect_err("A discovery outage should fail verification.");

	assert!(matches!(err, Error::Transient(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn tampered_tokens_fail_with_invalid_signature() {
	let verifier = Verifier::new(config(), Arc::new(StaticKeySet(jwk_set(&["k1"]))))
		.expect("Verifier should build.");
	let token = mint_bearer("user-a", "k1", json!({}));
	let (signed, signature) = token.rsplit_once('.').expect("JWT should have three parts.");
	let flipped = if signature.starts_with('A') { "B" } else { "A" };
	let tampered = format!("{signed}.{flipped}{}", &signature[1..]);
	let err = verifier.verify(&tampered).await.expect_err("Tampered token should be rejected.");

	assert!(matches!(err, Error::Auth(AuthError::InvalidSignature)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn bearer_header_feeds_the_verifier() {
	let verifier = Verifier::new(config(), Arc::new(StaticKeySet(jwk_set(&["k1"]))))
		.expect("Verifier should build.");
	let header = format!("Bearer {}", mint_bearer("user-h", "k1", json!({})));
	let token = inbound::bearer_token(&header).expect("Header should carry a bearer token.");
	let principal = verifier.verify(token).await.expect("Token should verify.");

	assert_eq!(principal.subject.as_str(), "user-h");
	assert_eq!(inbound::bearer_token("Basic abc"), Err(AuthError::Malformed));
}
