//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use jsonwebtoken::{Algorithm, EncodingKey, Header, jwk::JwkSet};
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};
// self
use delegated_auth_bridge::{
	auth::{CredentialKey, Principal, ScopeSet, ServiceCredential, ServiceId, SubjectId},
	flows::ReqwestAuthorizer,
	http::ReqwestHttpClient,
	reqwest::Client as ReqwestClient,
	service::{ClientAuthMethod, DefaultProviderStrategy, GrantType, ServiceDescriptor},
	store::{CompareAndSwapOutcome, CredentialStore, MemoryStore},
	url::Url,
};

pub const SERVICE: &str = "atlassian";
pub const CLIENT_ID: &str = "client-it";
pub const CLIENT_SECRET: &str = "secret-it";
pub const REDIRECT_URI: &str = "https://agent.example.com/oauth/callback";
pub const ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_Example";
pub const AUDIENCE: &str = "agent-client";
pub const SIGNING_SECRET: &[u8] = b"delegated-bridge-test-secret-0001";
pub const SIGNING_SECRET_B64: &str = "ZGVsZWdhdGVkLWJyaWRnZS10ZXN0LXNlY3JldC0wMDAx";

/// Reqwest client that accepts the self-signed certificates `httpmock` serves.
pub fn insecure_reqwest_client() -> ReqwestClient {
	ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.")
}

pub fn service_id() -> ServiceId {
	ServiceId::new(SERVICE).expect("Service identifier should be valid.")
}

pub fn scopes() -> ScopeSet {
	ScopeSet::new(["read:confluence-content.all", "offline_access"])
		.expect("Scope set should be valid.")
}

/// Atlassian-shaped descriptor whose endpoints point at the mock server.
pub fn descriptor(server: &MockServer) -> ServiceDescriptor {
	ServiceDescriptor::builder(service_id())
		.client_id(CLIENT_ID)
		.client_secret(CLIENT_SECRET)
		.authorization_endpoint(
			Url::parse(&server.url("/authorize")).expect("Mock authorize endpoint should parse."),
		)
		.token_endpoint(Url::parse(&server.url("/oauth/token")).expect("Mock token endpoint should parse."))
		.redirect_uri(Url::parse(REDIRECT_URI).expect("Redirect URI should parse."))
		.scopes(scopes())
		.support_grants([GrantType::AuthorizationCode, GrantType::RefreshToken])
		.client_auth(ClientAuthMethod::ClientSecretPost)
		.authorize_param("audience", "api.atlassian.com")
		.authorize_param("prompt", "consent")
		.build()
		.expect("Service descriptor should build.")
}

/// Authorizer over an in-memory store and the insecure test transport.
pub fn build_authorizer(descriptor: ServiceDescriptor) -> (ReqwestAuthorizer, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());

	(authorizer_over(store.clone(), descriptor), store)
}

/// Authorizer over an existing store, standing in for a second process that shares it.
pub fn authorizer_over(store: Arc<MemoryStore>, descriptor: ServiceDescriptor) -> ReqwestAuthorizer {
	ReqwestAuthorizer::with_http_client(
		store,
		Arc::new(DefaultProviderStrategy),
		ReqwestHttpClient::with_client(insecure_reqwest_client()),
	)
	.with_service(descriptor)
}

pub fn principal(subject: &str) -> Principal {
	Principal::new(
		SubjectId::new(subject).expect("Subject identifier should be valid."),
		ISSUER,
		OffsetDateTime::now_utc() + Duration::hours(1),
	)
}

pub fn key(principal: &Principal) -> CredentialKey {
	CredentialKey::new(principal.subject.clone(), service_id())
}

/// Writes a credential for `principal` expiring `expires_in` from now (negative = already
/// expired) and returns its version.
pub async fn seed_credential(
	store: &MemoryStore,
	principal: &Principal,
	access: &str,
	refresh: Option<&str>,
	expires_in: Duration,
) -> u64 {
	let now = OffsetDateTime::now_utc();
	let mut builder = ServiceCredential::builder(key(principal), scopes())
		.access_token(access)
		.issued_at(now - Duration::hours(1))
		.expires_at(now + expires_in);

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	let credential = builder.build().expect("Credential fixture should build.");

	match store
		.compare_and_swap(None, credential)
		.await
		.expect("Seeding the store should succeed.")
	{
		CompareAndSwapOutcome::Updated(version) => version,
		other => panic!("Seeding should create the credential, got {other:?}."),
	}
}

/// Token endpoint success body.
pub fn token_body(access: &str, refresh: Option<&str>, expires_in: i64) -> String {
	let mut body = json!({
		"access_token": access,
		"token_type": "bearer",
		"expires_in": expires_in,
		"scope": "read:confluence-content.all offline_access",
	});

	if let Some(refresh) = refresh {
		body["refresh_token"] = json!(refresh);
	}

	body.to_string()
}

/// JWKS document holding the shared HS256 test key under each `kid`.
pub fn jwks(kids: &[&str]) -> Value {
	let keys: Vec<_> =
		kids.iter().map(|kid| json!({ "kty": "oct", "kid": kid, "alg": "HS256", "k": SIGNING_SECRET_B64 })).collect();

	json!({ "keys": keys })
}

pub fn jwk_set(kids: &[&str]) -> JwkSet {
	serde_json::from_value(jwks(kids)).expect("JWKS fixture should parse.")
}

/// Bearer token for `subject` signed with the shared test key.
pub fn mint_bearer(subject: &str, kid: &str, overrides: Value) -> String {
	let now = OffsetDateTime::now_utc().unix_timestamp();
	let mut claims = json!({
		"sub": subject,
		"iss": ISSUER,
		"aud": AUDIENCE,
		"iat": now,
		"exp": now + 600,
		"scope": "openid agent/invoke",
	});

	if let (Some(claims), Some(overrides)) = (claims.as_object_mut(), overrides.as_object()) {
		for (name, value) in overrides {
			claims.insert(name.clone(), value.clone());
		}
	}

	let mut header = Header::new(Algorithm::HS256);

	header.kid = Some(kid.into());

	jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(SIGNING_SECRET))
		.expect("Bearer token should encode.")
}
