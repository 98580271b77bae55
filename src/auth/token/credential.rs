//! Per-(subject, service) OAuth credentials and their builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, ServiceId, SubjectId, token::secret::TokenSecret},
};

/// Store key: exactly one credential may exist per subject and service.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
	/// Subject the credential was granted for.
	pub subject: SubjectId,
	/// Service the credential authorizes against.
	pub service: ServiceId,
}
impl CredentialKey {
	/// Builds a key from its parts.
	pub fn new(subject: SubjectId, service: ServiceId) -> Self {
		Self { subject, service }
	}
}
impl Display for CredentialKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}@{}", self.subject, self.service)
	}
}

/// Lifecycle status of a credential's access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Issued-at lies in the future (clock skew with the provider).
	Pending,
	/// Access token is usable.
	Active,
	/// Access token reached its expiry instant.
	Expired,
}

/// Errors produced by [`ServiceCredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// No access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// No expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// OAuth token set held for one (subject, service) pair.
///
/// `version` is owned by the [`CredentialStore`](crate::store::CredentialStore): it is bumped on
/// every successful compare-and-swap and is the value callers pass back as the expected version.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceCredential {
	/// Subject + service this credential belongs to.
	pub key: CredentialKey,
	/// Scopes the provider granted.
	pub scope: ScopeSet,
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Refresh token secret, when the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Issued-at instant.
	pub issued_at: OffsetDateTime,
	/// Access token expiry instant.
	pub expires_at: OffsetDateTime,
	/// Store-assigned version; zero until first persisted.
	pub version: u64,
}
impl ServiceCredential {
	/// Returns a builder for the provided key and granted scope.
	pub fn builder(key: CredentialKey, scope: ScopeSet) -> ServiceCredentialBuilder {
		ServiceCredentialBuilder::new(key, scope)
	}

	/// Computes the status at `instant`.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		if instant < self.issued_at {
			CredentialStatus::Pending
		} else if instant >= self.expires_at {
			CredentialStatus::Expired
		} else {
			CredentialStatus::Active
		}
	}

	/// Returns `true` when the access token expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Expired)
	}

	/// Returns `true` when the access token is expired now.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if a refresh token is available.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.is_some()
	}

	/// Projects the access token handed to tools; the refresh token never leaves the store.
	pub fn access(&self) -> AccessToken {
		AccessToken {
			service: self.key.service.clone(),
			secret: self.access_token.clone(),
			scope: self.scope.clone(),
			expires_at: self.expires_at,
		}
	}
}
impl Debug for ServiceCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceCredential")
			.field("key", &self.key)
			.field("scope", &self.scope)
			.field("access_token", &self.access_token)
			.field("refresh_token", &self.refresh_token)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("version", &self.version)
			.finish()
	}
}

/// Builder for [`ServiceCredential`].
#[derive(Clone, Debug)]
pub struct ServiceCredentialBuilder {
	key: CredentialKey,
	scope: ScopeSet,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl ServiceCredentialBuilder {
	fn new(key: CredentialKey, scope: ScopeSet) -> Self {
		Self {
			key,
			scope,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the issued-at instant (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets the expiry relative to the issued-at instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Carries over an existing refresh secret, e.g. when a refresh response omits rotation.
	pub fn refresh_secret(mut self, secret: Option<TokenSecret>) -> Self {
		self.refresh_token = secret;

		self
	}

	/// Consumes the builder.
	pub fn build(self) -> Result<ServiceCredential, CredentialBuilderError> {
		let access_token = self.access_token.ok_or(CredentialBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		Ok(ServiceCredential {
			key: self.key,
			scope: self.scope,
			access_token,
			refresh_token: self.refresh_token,
			issued_at,
			expires_at,
			version: 0,
		})
	}
}

/// Access token injected into tool calls.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
	/// Service the token is valid for.
	pub service: ServiceId,
	/// Bearer secret.
	pub secret: TokenSecret,
	/// Scopes granted to the token.
	pub scope: ScopeSet,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Value for an `Authorization` request header.
	pub fn bearer_header(&self) -> String {
		format!("Bearer {}", self.secret.expose())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("service", &self.service)
			.field("secret", &self.secret)
			.field("scope", &self.scope)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
