//! Token endpoint facade over the `oauth2` crate.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, ScopeSet, ServiceCredential, TokenSecret},
	error::{ConfigError, TransientError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	service::{
		ClientAuthMethod, GrantType, ProviderErrorContext, ProviderErrorKind, ProviderStrategy,
		ServiceDescriptor,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Per-service token client built from a [`ServiceDescriptor`].
pub(crate) struct BasicFacade<'a, C>
where
	C: ?Sized + TokenHttpClient,
{
	oauth_client: ConfiguredBasicClient,
	http_client: &'a C,
	strategy: &'a dyn ProviderStrategy,
}
impl<'a, C> BasicFacade<'a, C>
where
	C: ?Sized + TokenHttpClient,
{
	pub(crate) fn from_descriptor(
		descriptor: &ServiceDescriptor,
		http_client: &'a C,
		strategy: &'a dyn ProviderStrategy,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidUrl { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidUrl { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(descriptor.client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		if let Some(secret) = descriptor.client_secret() {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}
		if matches!(descriptor.client_auth, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client, strategy })
	}

	/// Redeems an authorization code for a credential.
	pub(crate) async fn exchange_code(
		&self,
		key: CredentialKey,
		code: &str,
		pkce_verifier: Option<&TokenSecret>,
		requested_scope: &ScopeSet,
		redirect_uri: &Url,
	) -> Result<ServiceCredential> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidUrl { source })?;
		let mut request = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_redirect_uri(Cow::Owned(redirect_url));

		if let Some(verifier) = pkce_verifier {
			request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.expose().to_owned()));
		}
		for (name, value) in self.extra_params(GrantType::AuthorizationCode) {
			request = request.add_extra_param(name, value);
		}

		let response = request.request_async(&handle).await.map_err(|err| {
			self.map_request_error(GrantType::AuthorizationCode, meta.take(), err)
		})?;

		credential_from_response(key, requested_scope, None, response)
	}

	/// Redeems a refresh token. A response without a rotated refresh token keeps the old one.
	pub(crate) async fn refresh(&self, current: &ServiceCredential) -> Result<ServiceCredential> {
		let refresh_secret = current.refresh_token.as_ref().ok_or_else(|| Error::RefreshFailed {
			reason: "no refresh token is stored".into(),
		})?;
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let refresh_token = RefreshToken::new(refresh_secret.expose().to_owned());
		let mut request = self.oauth_client.exchange_refresh_token(&refresh_token);

		for (name, value) in self.extra_params(GrantType::RefreshToken) {
			request = request.add_extra_param(name, value);
		}

		let response = request
			.request_async(&handle)
			.await
			.map_err(|err| self.map_request_error(GrantType::RefreshToken, meta.take(), err))?;

		credential_from_response(
			current.key.clone(),
			&current.scope,
			Some(refresh_secret.clone()),
			response,
		)
	}

	fn extra_params(&self, grant: GrantType) -> BTreeMap<String, String> {
		let mut form = BTreeMap::new();

		self.strategy.augment_token_request(grant, &mut form);

		form
	}

	fn map_request_error(
		&self,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let meta = meta.as_ref();
		let status = meta.and_then(|m| m.status);
		let retry_after = meta.and_then(|m| m.retry_after);

		match err {
			RequestTokenError::ServerResponse(response) =>
				self.map_server_response(grant, response, meta),
			RequestTokenError::Request(error) => self.http_client.map_transport_error(meta, error),
			RequestTokenError::Parse(source, body) => {
				let mut ctx = ProviderErrorContext::new(grant)
					.with_body_preview(String::from_utf8_lossy(&body).into_owned());

				if let Some(status) = status {
					ctx = ctx.with_http_status(status);
				}

				match status {
					Some(code) if (400..500).contains(&code) => classify(self.strategy, grant, &ctx),
					_ => TransientError::ResponseParse { endpoint: "Token endpoint", source, status }
						.into(),
				}
			},
			RequestTokenError::Other(message) =>
				TransientError::token_endpoint(message, status, retry_after).into(),
		}
	}

	fn map_server_response(
		&self,
		grant: GrantType,
		response: BasicErrorResponse,
		meta: Option<&ResponseMetadata>,
	) -> Error {
		let mut ctx =
			ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_owned());

		if let Some(description) = response.error_description() {
			ctx = ctx.with_error_description(description.clone());
		}
		if let Some(status) = meta.and_then(|m| m.status) {
			ctx = ctx.with_http_status(status);
		}

		match self.strategy.classify_token_error(&ctx) {
			ProviderErrorKind::Transient => TransientError::token_endpoint(
				ctx.reason(),
				ctx.http_status,
				meta.and_then(|m| m.retry_after),
			)
			.into(),
			_ => classify(self.strategy, grant, &ctx),
		}
	}
}

fn classify(strategy: &dyn ProviderStrategy, grant: GrantType, ctx: &ProviderErrorContext) -> Error {
	let reason = ctx.reason();

	match strategy.classify_token_error(ctx) {
		ProviderErrorKind::InvalidGrant => match grant {
			GrantType::AuthorizationCode => Error::ExchangeFailed { reason },
			GrantType::RefreshToken => Error::RefreshFailed { reason },
		},
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason },
		ProviderErrorKind::InsufficientScope => Error::InsufficientScope { reason },
		ProviderErrorKind::Transient =>
			TransientError::token_endpoint(reason, ctx.http_status, None).into(),
	}
}

fn credential_from_response(
	key: CredentialKey,
	requested_scope: &ScopeSet,
	previous_refresh: Option<TokenSecret>,
	response: BasicTokenResponse,
) -> Result<ServiceCredential> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let granted = match response.scopes() {
		Some(scopes) =>
			ScopeSet::new(scopes.iter().map(|scope| scope.as_str())).map_err(ConfigError::from)?,
		None => requested_scope.clone(),
	};
	let refresh = response
		.refresh_token()
		.map(|token| TokenSecret::new(token.secret().to_owned()))
		.or(previous_refresh);

	ServiceCredential::builder(key, granted)
		.access_token(response.access_token().secret().to_owned())
		.refresh_secret(refresh)
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(Duration::seconds(expires_in))
		.build()
		.map_err(|e| ConfigError::from(e).into())
}
