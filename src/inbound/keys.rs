//! Sources of the issuer's JSON Web Key Set.

// crates.io
use jsonwebtoken::jwk::JwkSet;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")]
use crate::{
	error::{TransientError, TransportError},
	http,
};

/// Boxed future returned by [`KeySetSource::fetch`].
pub type KeySetFuture<'a> = Pin<Box<dyn Future<Output = Result<JwkSet>> + 'a + Send>>;

/// Supplies the signing keys the verifier trusts.
///
/// Fetches should always go to the origin; the verifier does its own caching.
pub trait KeySetSource
where
	Self: Send + Sync,
{
	/// Loads the current key set.
	fn fetch(&self) -> KeySetFuture<'_>;
}

/// Fixed key set, for tests and deployments that pin keys in configuration.
#[derive(Clone, Debug)]
pub struct StaticKeySet(pub JwkSet);
impl KeySetSource for StaticKeySet {
	fn fetch(&self) -> KeySetFuture<'_> {
		let keys = self.0.clone();

		Box::pin(async move { Ok(keys) })
	}
}

#[cfg(feature = "reqwest")]
#[derive(Deserialize)]
struct DiscoveryDocument {
	jwks_uri: Url,
}

/// Key source backed by an OIDC discovery document (`.well-known/openid-configuration`).
///
/// The `jwks_uri` is resolved once and remembered.
#[cfg(feature = "reqwest")]
#[derive(Debug)]
pub struct DiscoveryKeySource {
	http: ReqwestClient,
	discovery_url: Url,
	jwks_uri: RwLock<Option<Url>>,
}
#[cfg(feature = "reqwest")]
impl DiscoveryKeySource {
	/// Creates a source that reads `jwks_uri` from `discovery_url`.
	pub fn new(http: ReqwestClient, discovery_url: Url) -> Self {
		Self { http, discovery_url, jwks_uri: RwLock::new(None) }
	}

	/// Creates a source that skips discovery and reads `jwks_uri` directly.
	pub fn with_jwks_uri(http: ReqwestClient, jwks_uri: Url) -> Self {
		Self { http, discovery_url: jwks_uri.clone(), jwks_uri: RwLock::new(Some(jwks_uri)) }
	}

	async fn jwks_uri(&self) -> Result<Url> {
		let cached = self.jwks_uri.read().clone();

		if let Some(uri) = cached {
			return Ok(uri);
		}

		#[cfg(feature = "tracing")]
		tracing::info!(url = %self.discovery_url, "fetching OIDC discovery document");

		let document: DiscoveryDocument =
			get_json(&self.http, &self.discovery_url, "Discovery endpoint").await?;

		*self.jwks_uri.write() = Some(document.jwks_uri.clone());

		Ok(document.jwks_uri)
	}
}
#[cfg(feature = "reqwest")]
impl KeySetSource for DiscoveryKeySource {
	fn fetch(&self) -> KeySetFuture<'_> {
		Box::pin(async move {
			let uri = self.jwks_uri().await?;

			#[cfg(feature = "tracing")]
			tracing::info!(jwks_uri = %uri, "fetching JWKS keys");

			get_json(&self.http, &uri, "JWKS endpoint").await
		})
	}
}

#[cfg(feature = "reqwest")]
async fn get_json<T>(http: &ReqwestClient, url: &Url, endpoint: &'static str) -> Result<T>
where
	T: for<'de> Deserialize<'de>,
{
	let response = http.get(url.clone()).send().await.map_err(TransportError::from)?;
	let status = response.status();

	if !status.is_success() {
		return Err(TransientError::Upstream {
			endpoint,
			message: format!("HTTP {status}"),
			status: Some(status.as_u16()),
			retry_after: http::parse_retry_after(response.headers()),
		}
		.into());
	}

	let body = response.bytes().await.map_err(TransportError::from)?;
	let mut deserializer = serde_json::Deserializer::from_slice(&body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
		TransientError::ResponseParse { endpoint, source, status: Some(status.as_u16()) }.into()
	})
}
