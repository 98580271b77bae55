//! JSON configuration for the inbound verifier and the registered outbound services.
//!
//! ```json
//! {
//!   "inbound": {
//!     "issuer": "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_Example",
//!     "audience": "agent-client-id",
//!     "algorithms": ["RS256"]
//!   },
//!   "services": [{
//!     "id": "atlassian",
//!     "client_id": "abc",
//!     "client_secret": "shh",
//!     "authorization_endpoint": "https://auth.atlassian.com/authorize",
//!     "token_endpoint": "https://auth.atlassian.com/oauth/token",
//!     "redirect_uri": "https://agent.example.com/oauth/callback",
//!     "scopes": "read:confluence-content.all write:confluence-content offline_access",
//!     "scopes_env": "atlassian_scopes",
//!     "authorize_params": { "audience": "api.atlassian.com", "prompt": "consent" }
//!   }]
//! }
//! ```

// std
use std::path::Path;
// crates.io
use jsonwebtoken::Algorithm;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, ServiceId},
	error::ConfigError,
	flows::Authorizer,
	http::TokenHttpClient,
	inbound::VerifierConfig,
	service::{ClientAuthMethod, GrantType, ServiceDescriptor, ServiceQuirks},
};
#[cfg(feature = "reqwest")] use crate::inbound::{DiscoveryKeySource, KeySetSource};

const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Top-level bridge configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
	/// Inbound bearer token verification.
	pub inbound: InboundConfig,
	/// Outbound services tools may request tokens for.
	#[serde(default)]
	pub services: Vec<ServiceConfig>,
	/// Seconds a pending consent stays redeemable.
	#[serde(default = "default_consent_ttl_secs")]
	pub consent_ttl_secs: u64,
	/// Seconds before expiry at which credentials are refreshed early.
	#[serde(default = "default_preemptive_window_secs")]
	pub preemptive_window_secs: u64,
}
impl BridgeConfig {
	/// Parses a JSON document, reporting the path of the first offending field.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| ConfigError::Parse {
			path: e.path().to_string(),
			source: e.into_inner(),
		})
	}

	/// Reads and parses a JSON file.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let raw = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;

		Self::from_json_str(&raw)
	}

	/// Pending-consent TTL.
	pub fn consent_ttl(&self) -> Duration {
		Duration::seconds(saturating_secs(self.consent_ttl_secs))
	}

	/// Preemptive refresh window.
	pub fn preemptive_window(&self) -> Duration {
		Duration::seconds(saturating_secs(self.preemptive_window_secs))
	}

	/// Builds validated descriptors, reading scope overrides from the process environment.
	pub fn service_descriptors(&self) -> Result<Vec<ServiceDescriptor>, ConfigError> {
		self.service_descriptors_with_env(|name| std::env::var(name).ok())
	}

	/// Builds validated descriptors, resolving `scopes_env` through `lookup`.
	pub fn service_descriptors_with_env<F>(&self, lookup: F) -> Result<Vec<ServiceDescriptor>, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		self.services.iter().map(|service| service.descriptor(&lookup)).collect()
	}

	/// Registers every configured service on `authorizer` and applies the consent and refresh
	/// timings.
	pub fn apply<C>(&self, authorizer: Authorizer<C>) -> Result<Authorizer<C>, ConfigError>
	where
		C: ?Sized + TokenHttpClient,
	{
		let authorizer = self
			.service_descriptors()?
			.into_iter()
			.fold(authorizer, |authorizer, descriptor| authorizer.with_service(descriptor));

		Ok(authorizer
			.with_consent_ttl(self.consent_ttl())
			.with_preemptive_window(self.preemptive_window()))
	}
}

/// Inbound verifier settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundConfig {
	/// Expected `iss`.
	pub issuer: String,
	/// Expected `aud` (or Cognito `client_id`).
	pub audience: String,
	/// OIDC discovery document; defaults to the issuer's well-known location.
	#[serde(default)]
	pub discovery_url: Option<Url>,
	/// JWKS location; skips discovery when set.
	#[serde(default)]
	pub jwks_uri: Option<Url>,
	/// Accepted signing algorithms.
	#[serde(default = "default_algorithms")]
	pub algorithms: Vec<Algorithm>,
	/// Clock skew tolerance in seconds.
	#[serde(default = "default_leeway_secs")]
	pub leeway_secs: u64,
	/// Key set and verification cache lifetime in seconds.
	#[serde(default = "default_cache_ttl_secs")]
	pub cache_ttl_secs: u64,
}
impl InboundConfig {
	/// Verifier settings derived from this section.
	pub fn verifier_config(&self) -> VerifierConfig {
		VerifierConfig::new(self.issuer.clone(), self.audience.clone())
			.with_algorithms(self.algorithms.iter().copied())
			.with_leeway(Duration::seconds(saturating_secs(self.leeway_secs)))
			.with_key_cache_ttl(Duration::seconds(saturating_secs(self.cache_ttl_secs)))
	}

	/// Where the discovery document lives.
	pub fn discovery_url(&self) -> Result<Url, ConfigError> {
		if let Some(url) = self.discovery_url.as_ref() {
			return Ok(url.clone());
		}

		let issuer = format!("{}/", self.issuer.trim_end_matches('/'));

		Url::parse(&issuer)
			.and_then(|issuer| issuer.join(DISCOVERY_PATH))
			.map_err(|source| ConfigError::InvalidUrl { source })
	}

	/// Key source fetching from `jwks_uri`, or through discovery when it is unset.
	#[cfg(feature = "reqwest")]
	pub fn key_source(&self, http: ReqwestClient) -> Result<Arc<dyn KeySetSource>, ConfigError> {
		Ok(match self.jwks_uri.as_ref() {
			Some(jwks_uri) => Arc::new(DiscoveryKeySource::with_jwks_uri(http, jwks_uri.clone())),
			None => Arc::new(DiscoveryKeySource::new(http, self.discovery_url()?)),
		})
	}
}

/// One outbound service.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
	/// Service identifier tools refer to.
	pub id: ServiceId,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret; read from configuration but never written back out.
	#[serde(default, skip_serializing)]
	pub client_secret: Option<String>,
	/// Browser-facing authorization endpoint.
	pub authorization_endpoint: Url,
	/// Token endpoint.
	pub token_endpoint: Url,
	/// Optional revocation endpoint. Validated and carried on the descriptor only;
	/// [`Authorizer::revoke`] deletes the stored credential without calling it.
	#[serde(default)]
	pub revocation_endpoint: Option<Url>,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
	/// Requested scopes, as a delimited string or a list.
	#[serde(default)]
	pub scopes: ScopeSet,
	/// Environment variable whose whitespace-separated value replaces `scopes` when set.
	#[serde(default)]
	pub scopes_env: Option<String>,
	/// Token endpoint client authentication.
	#[serde(default)]
	pub client_auth: ClientAuthMethod,
	/// Whether the refresh token grant is used.
	#[serde(default = "default_true")]
	pub refresh: bool,
	/// PKCE and scope formatting toggles.
	#[serde(default)]
	pub quirks: ServiceQuirks,
	/// Extra authorization URL parameters.
	#[serde(default)]
	pub authorize_params: BTreeMap<String, String>,
}
impl ServiceConfig {
	fn descriptor<F>(&self, lookup: &F) -> Result<ServiceDescriptor, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let scopes = match self.scopes_env.as_deref().and_then(lookup) {
			Some(raw) if !raw.trim().is_empty() => ScopeSet::new(raw.split_whitespace())?,
			_ => self.scopes.clone(),
		};
		let mut builder = ServiceDescriptor::builder(self.id.clone())
			.client_id(self.client_id.clone())
			.authorization_endpoint(self.authorization_endpoint.clone())
			.token_endpoint(self.token_endpoint.clone())
			.redirect_uri(self.redirect_uri.clone())
			.scopes(scopes)
			.support_grant(GrantType::AuthorizationCode)
			.client_auth(self.client_auth)
			.quirks(self.quirks);

		if let Some(secret) = self.client_secret.as_ref() {
			builder = builder.client_secret(secret.clone());
		}
		if let Some(revocation) = self.revocation_endpoint.as_ref() {
			builder = builder.revocation_endpoint(revocation.clone());
		}
		if self.refresh {
			builder = builder.support_grant(GrantType::RefreshToken);
		}
		for (name, value) in &self.authorize_params {
			builder = builder.authorize_param(name.clone(), value.clone());
		}

		Ok(builder.build()?)
	}
}
impl Debug for ServiceConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceConfig")
			.field("id", &self.id)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("authorization_endpoint", &self.authorization_endpoint)
			.field("token_endpoint", &self.token_endpoint)
			.field("revocation_endpoint", &self.revocation_endpoint)
			.field("redirect_uri", &self.redirect_uri)
			.field("scopes", &self.scopes)
			.field("scopes_env", &self.scopes_env)
			.field("client_auth", &self.client_auth)
			.field("refresh", &self.refresh)
			.field("quirks", &self.quirks)
			.field("authorize_params", &self.authorize_params)
			.finish()
	}
}

fn saturating_secs(secs: u64) -> i64 {
	i64::try_from(secs).unwrap_or(i64::MAX)
}

fn default_consent_ttl_secs() -> u64 {
	600
}

fn default_preemptive_window_secs() -> u64 {
	60
}

fn default_algorithms() -> Vec<Algorithm> {
	vec![Algorithm::RS256]
}

fn default_leeway_secs() -> u64 {
	60
}

fn default_cache_ttl_secs() -> u64 {
	3_600
}

fn default_true() -> bool {
	true
}
