//! Consent flows awaiting the provider redirect.

// self
use crate::{
	_prelude::*,
	auth::{CredentialKey, ScopeSet, TokenSecret},
};

/// Record of a consent flow the user has not completed yet.
///
/// Keyed in the store by the opaque `state`; the PKCE verifier never leaves the bridge.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingConsent {
	/// Subject + service the consent is for.
	pub key: CredentialKey,
	/// Opaque `state` the provider echoes back.
	pub state: String,
	/// Redirect URI sent with the authorization request; repeated on exchange.
	pub redirect_uri: Url,
	/// Scopes requested from the provider.
	pub scopes: ScopeSet,
	/// PKCE verifier paired with the challenge in the authorization URL.
	pub pkce_verifier: Option<TokenSecret>,
	/// Authorization URL handed to the user.
	pub authorization_url: Url,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Instant after which the consent can no longer be completed.
	pub expires_at: OffsetDateTime,
}
impl PendingConsent {
	/// Whether the consent timed out at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}
impl Debug for PendingConsent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingConsent")
			.field("key", &self.key)
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("scopes", &self.scopes)
			.field("pkce_verifier", &self.pkce_verifier)
			.field("authorization_url", &self.authorization_url)
			.field("created_at", &self.created_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
