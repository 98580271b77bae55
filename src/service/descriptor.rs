//! Static configuration for one target service, plus its validating builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, ServiceId, TokenSecret},
	service::{GrantType, SupportedGrants},
};

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// Public clients that prove possession via PKCE only.
	NoneWithPkce,
}

/// Endpoints declared by a service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
	/// Authorization endpoint the user's browser is sent to.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
	/// Optional revocation endpoint. Not called by the bridge; revocation is local.
	pub revocation: Option<Url>,
}

/// Provider-specific behavior toggles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceQuirks {
	/// Send an S256 PKCE challenge with the authorization request.
	pub pkce: bool,
	/// Character used to join scopes in the `scope` parameter.
	pub scope_delimiter: char,
}
impl Default for ServiceQuirks {
	fn default() -> Self {
		Self { pkce: true, scope_delimiter: ' ' }
	}
}

/// Errors raised while building a descriptor.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ServiceDescriptorError {
	/// Client identifier is required.
	#[error("Missing client identifier.")]
	MissingClientId,
	/// Authorization endpoint is required.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is required.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Redirect URI is required.
	#[error("Missing redirect URI.")]
	MissingRedirectUri,
	/// The consent flow needs the authorization_code grant.
	#[error("Descriptor must enable the authorization_code grant.")]
	AuthorizationCodeDisabled,
	/// Public clients cannot skip PKCE.
	#[error("Clients without a secret must send PKCE challenges.")]
	PublicClientWithoutPkce,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Scope delimiters must be printable.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
	/// Authorization parameters may not override the ones the flow sets.
	#[error("Authorization parameter `{name}` is reserved.")]
	ReservedAuthorizeParam {
		/// Offending parameter name.
		name: String,
	},
}

/// Static, validated configuration for one target service.
///
/// Immutable once built. The client secret is write-only: it is used for token endpoint
/// authentication inside the crate and is neither serialized nor printed.
#[derive(Clone)]
pub struct ServiceDescriptor {
	/// Service identifier.
	pub id: ServiceId,
	/// OAuth client identifier.
	pub client_id: String,
	client_secret: Option<TokenSecret>,
	/// Endpoint definitions.
	pub endpoints: ServiceEndpoints,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
	/// Scopes requested during consent.
	pub scopes: ScopeSet,
	/// Enabled grants.
	pub supported_grants: SupportedGrants,
	/// Client authentication mode for the token endpoint.
	pub client_auth: ClientAuthMethod,
	/// Provider quirks.
	pub quirks: ServiceQuirks,
	/// Fixed extra query parameters for the authorization URL.
	pub authorize_params: Vec<(String, String)>,
}
impl ServiceDescriptor {
	const RESERVED_AUTHORIZE_PARAMS: [&'static str; 7] = [
		"response_type",
		"client_id",
		"redirect_uri",
		"scope",
		"state",
		"code_challenge",
		"code_challenge_method",
	];

	/// Creates a builder for `id`.
	pub fn builder(id: ServiceId) -> ServiceDescriptorBuilder {
		ServiceDescriptorBuilder::new(id)
	}

	/// Checks whether the descriptor enables `grant`.
	pub fn supports(&self, grant: GrantType) -> bool {
		self.supported_grants.supports(grant)
	}

	/// Whether a client secret is configured.
	pub fn has_client_secret(&self) -> bool {
		self.client_secret.is_some()
	}

	pub(crate) fn client_secret(&self) -> Option<&str> {
		match self.client_auth {
			ClientAuthMethod::NoneWithPkce => None,
			_ => self.client_secret.as_ref().map(TokenSecret::expose),
		}
	}

	fn validate(&self) -> Result<(), ServiceDescriptorError> {
		if self.client_id.is_empty() {
			return Err(ServiceDescriptorError::MissingClientId);
		}
		if !self.supports(GrantType::AuthorizationCode) {
			return Err(ServiceDescriptorError::AuthorizationCodeDisabled);
		}
		if self.client_secret().is_none() && !self.quirks.pkce {
			return Err(ServiceDescriptorError::PublicClientWithoutPkce);
		}

		require_https("authorization", &self.endpoints.authorization)?;
		require_https("token", &self.endpoints.token)?;

		if let Some(revocation) = self.endpoints.revocation.as_ref() {
			require_https("revocation", revocation)?;
		}
		if !is_loopback(&self.redirect_uri) {
			require_https("redirect", &self.redirect_uri)?;
		}
		if self.quirks.scope_delimiter.is_control() {
			return Err(ServiceDescriptorError::InvalidScopeDelimiter {
				delimiter: self.quirks.scope_delimiter,
			});
		}
		if let Some((name, _)) = self
			.authorize_params
			.iter()
			.find(|(name, _)| Self::RESERVED_AUTHORIZE_PARAMS.contains(&name.as_str()))
		{
			return Err(ServiceDescriptorError::ReservedAuthorizeParam { name: name.clone() });
		}

		Ok(())
	}
}
impl Debug for ServiceDescriptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceDescriptor")
			.field("id", &self.id)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("endpoints", &self.endpoints)
			.field("redirect_uri", &self.redirect_uri)
			.field("scopes", &self.scopes)
			.field("supported_grants", &self.supported_grants)
			.field("client_auth", &self.client_auth)
			.field("quirks", &self.quirks)
			.field("authorize_params", &self.authorize_params)
			.finish()
	}
}

/// Builder for [`ServiceDescriptor`].
#[derive(Debug)]
pub struct ServiceDescriptorBuilder {
	id: ServiceId,
	client_id: Option<String>,
	client_secret: Option<TokenSecret>,
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	revocation_endpoint: Option<Url>,
	redirect_uri: Option<Url>,
	scopes: ScopeSet,
	supported_grants: SupportedGrants,
	client_auth: ClientAuthMethod,
	quirks: ServiceQuirks,
	authorize_params: Vec<(String, String)>,
}
impl ServiceDescriptorBuilder {
	fn new(id: ServiceId) -> Self {
		Self {
			id,
			client_id: None,
			client_secret: None,
			authorization_endpoint: None,
			token_endpoint: None,
			revocation_endpoint: None,
			redirect_uri: None,
			scopes: ScopeSet::default(),
			supported_grants: SupportedGrants::default(),
			client_auth: ClientAuthMethod::default(),
			quirks: ServiceQuirks::default(),
			authorize_params: Vec::new(),
		}
	}

	/// Sets the OAuth client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the client secret.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the optional revocation endpoint.
	pub fn revocation_endpoint(mut self, url: Url) -> Self {
		self.revocation_endpoint = Some(url);

		self
	}

	/// Sets the redirect URI the provider calls back with the authorization code.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Sets the scopes requested during consent.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Enables a grant.
	pub fn support_grant(mut self, grant: GrantType) -> Self {
		self.supported_grants = self.supported_grants.enable(grant);

		self
	}

	/// Enables several grants.
	pub fn support_grants<I>(mut self, grants: I) -> Self
	where
		I: IntoIterator<Item = GrantType>,
	{
		for grant in grants {
			self.supported_grants = self.supported_grants.enable(grant);
		}

		self
	}

	/// Overrides the client authentication mode.
	pub fn client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ServiceQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Appends a fixed authorization URL query parameter.
	pub fn authorize_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.authorize_params.push((name.into(), value.into()));

		self
	}

	/// Consumes the builder and validates the descriptor.
	pub fn build(self) -> Result<ServiceDescriptor, ServiceDescriptorError> {
		let client_id = self.client_id.ok_or(ServiceDescriptorError::MissingClientId)?;
		let authorization = self
			.authorization_endpoint
			.ok_or(ServiceDescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ServiceDescriptorError::MissingTokenEndpoint)?;
		let redirect_uri = self.redirect_uri.ok_or(ServiceDescriptorError::MissingRedirectUri)?;
		let descriptor = ServiceDescriptor {
			id: self.id,
			client_id,
			client_secret: self.client_secret,
			endpoints: ServiceEndpoints { authorization, token, revocation: self.revocation_endpoint },
			redirect_uri,
			scopes: self.scopes,
			supported_grants: self.supported_grants,
			client_auth: self.client_auth,
			quirks: self.quirks,
			authorize_params: self.authorize_params,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

fn require_https(name: &'static str, url: &Url) -> Result<(), ServiceDescriptorError> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(ServiceDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	url.scheme() == "http"
		&& matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("URL fixture should parse.")
	}

	fn builder() -> ServiceDescriptorBuilder {
		ServiceDescriptor::builder(ServiceId::new("atlassian").expect("Service id should be valid."))
			.client_id("client")
			.client_secret("secret")
			.authorization_endpoint(url("https://auth.atlassian.com/authorize"))
			.token_endpoint(url("https://auth.atlassian.com/oauth/token"))
			.redirect_uri(url("https://agent.example.com/oauth/callback"))
			.support_grants([GrantType::AuthorizationCode, GrantType::RefreshToken])
	}

	#[test]
	fn builds_and_redacts_secret() {
		let descriptor = builder()
			.authorize_param("audience", "api.atlassian.com")
			.build()
			.expect("Descriptor should build.");

		assert!(descriptor.supports(GrantType::RefreshToken));
		assert!(descriptor.has_client_secret());
		assert_eq!(descriptor.client_secret(), Some("secret"));
		assert!(!format!("{descriptor:?}").contains("secret\""));
	}

	#[test]
	fn rejects_insecure_endpoints_but_allows_loopback_redirects() {
		let err = builder()
			.token_endpoint(url("http://auth.atlassian.com/oauth/token"))
			.build()
			.expect_err("Plain HTTP token endpoints must be rejected.");

		assert!(matches!(err, ServiceDescriptorError::InsecureEndpoint { endpoint: "token", .. }));

		builder()
			.redirect_uri(url("http://localhost:8080/callback"))
			.build()
			.expect("Loopback redirect URIs should be accepted.");

		let err = builder()
			.redirect_uri(url("http://agent.example.com/callback"))
			.build()
			.expect_err("Non-loopback HTTP redirects must be rejected.");

		assert!(matches!(err, ServiceDescriptorError::InsecureEndpoint { endpoint: "redirect", .. }));
	}

	#[test]
	fn requires_authorization_code_and_pkce_for_public_clients() {
		let err = ServiceDescriptor::builder(ServiceId::new("svc").expect("Service id is valid."))
			.client_id("client")
			.authorization_endpoint(url("https://example.com/authorize"))
			.token_endpoint(url("https://example.com/token"))
			.redirect_uri(url("https://example.com/cb"))
			.support_grant(GrantType::RefreshToken)
			.build()
			.expect_err("Descriptors without authorization_code must be rejected.");

		assert_eq!(err, ServiceDescriptorError::AuthorizationCodeDisabled);

		let err = builder()
			.client_auth(ClientAuthMethod::NoneWithPkce)
			.quirks(ServiceQuirks { pkce: false, ..ServiceQuirks::default() })
			.build()
			.expect_err("Public clients must keep PKCE.");

		assert_eq!(err, ServiceDescriptorError::PublicClientWithoutPkce);
	}

	#[test]
	fn reserved_authorize_params_are_rejected() {
		let err = builder()
			.authorize_param("state", "fixed")
			.build()
			.expect_err("Reserved parameters must be rejected.");

		assert!(matches!(err, ServiceDescriptorError::ReservedAuthorizeParam { .. }));
	}
}
