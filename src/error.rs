//! Error taxonomy shared by the verifier, authorizer, stores, and tool wrapper.

// self
use crate::{_prelude::*, auth::ServiceId};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Consent being required is not represented here; see
/// [`TokenGrant::ConsentRequired`](crate::flows::TokenGrant::ConsentRequired).
#[derive(Debug, ThisError)]
pub enum Error {
	/// Inbound bearer token was rejected.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The consent `state` is unknown or its pending consent timed out.
	#[error("Consent request is unknown or has expired.")]
	ConsentExpired,
	/// Token endpoint rejected the authorization code, or the code was already redeemed.
	#[error("Authorization code exchange failed: {reason}.")]
	ExchangeFailed {
		/// Provider- or bridge-supplied reason string.
		reason: String,
	},
	/// Token endpoint rejected the refresh token.
	#[error("Refresh failed: {reason}.")]
	RefreshFailed {
		/// Provider- or bridge-supplied reason string.
		reason: String,
	},
	/// Client authentication against the token endpoint failed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider refused the requested scopes.
	#[error("Requested scopes were refused: {reason}.")]
	InsufficientScope {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// No descriptor is registered for the service.
	#[error("Service `{service}` is not registered.")]
	UnknownService {
		/// Requested service identifier.
		service: ServiceId,
	},
}
impl Error {
	/// Whether the failure invalidates the stored grant and calls for a new consent flow.
	pub fn requires_consent(&self) -> bool {
		matches!(self, Self::RefreshFailed { .. } | Self::ExchangeFailed { .. })
	}
}

/// Inbound verification failure kinds.
///
/// Every kind renders the same message so responses cannot be used to probe which check
/// failed; match on the variant to distinguish them in code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ThisError)]
pub enum AuthError {
	/// Token is not a well-formed JWT or lacks a required claim.
	#[error("Bearer token rejected.")]
	Malformed,
	/// Signature does not verify against any key published by the issuer.
	#[error("Bearer token rejected.")]
	InvalidSignature,
	/// `exp` has passed.
	#[error("Bearer token rejected.")]
	Expired,
	/// `nbf` lies in the future.
	#[error("Bearer token rejected.")]
	NotYetValid,
	/// Neither `aud` nor `client_id` matches the expected audience.
	#[error("Bearer token rejected.")]
	AudienceMismatch,
	/// `iss` is not the configured issuer.
	#[error("Bearer token rejected.")]
	IssuerUnknown,
}
impl AuthError {
	/// Stable label for logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Malformed => "malformed",
			Self::InvalidSignature => "invalid_signature",
			Self::Expired => "expired",
			Self::NotYetValid => "not_yet_valid",
			Self::AudienceMismatch => "audience_mismatch",
			Self::IssuerUnknown => "issuer_unknown",
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured URL could not be parsed or extended.
	#[error("A configured URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::service::ServiceDescriptorError),
	/// Configuration document could not be read.
	#[error("Failed to read configuration from {path}.")]
	Read {
		/// Path that failed to load.
		path: String,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is invalid at `{path}`.")]
	Parse {
		/// JSON path of the offending field.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// Descriptor does not enable the requested grant.
	#[error("Service `{service}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Service identifier string.
		service: String,
		/// Disabled grant label.
		grant: &'static str,
	},
	/// Scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Credential builder validation failed.
	#[error("Unable to build service credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// The configured JWT algorithm list is empty.
	#[error("At least one JWT signing algorithm must be allowed.")]
	NoAllowedAlgorithms,
}
impl ConfigError {
	/// Wraps a transport's builder failure.
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Upstream returned an unexpected but non-fatal response.
	#[error("{endpoint} returned an unexpected response: {message}.")]
	Upstream {
		/// Which upstream endpoint failed (token endpoint, JWKS, discovery).
		endpoint: &'static str,
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Upstream responded with JSON that could not be parsed.
	#[error("{endpoint} returned malformed JSON.")]
	ResponseParse {
		/// Which upstream endpoint failed.
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl TransientError {
	/// Builds an [`TransientError::Upstream`] for the token endpoint.
	pub fn token_endpoint(
		message: impl Into<String>,
		status: Option<u16>,
		retry_after: Option<Duration>,
	) -> Self {
		Self::Upstream { endpoint: "Token endpoint", message: message.into(), status, retry_after }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling an upstream endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling an upstream endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
