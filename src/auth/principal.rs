//! Verified caller identity.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, SubjectId},
};

/// Identity produced by a successful inbound verification.
///
/// Lives for one request/session only and is never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
	/// Stable subject identifier (`sub`).
	pub subject: SubjectId,
	/// Issuer that vouched for the subject (`iss`).
	pub issuer: String,
	/// Scopes carried by the bearer token (`scope` / `scp`).
	pub scopes: ScopeSet,
	/// Remaining claims, kept for callers that map custom claims.
	pub claims: BTreeMap<String, serde_json::Value>,
	/// Bearer token expiry (`exp`).
	pub expires_at: OffsetDateTime,
}
impl Principal {
	/// Builds a principal with no scopes or extra claims.
	pub fn new(subject: SubjectId, issuer: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self {
			subject,
			issuer: issuer.into(),
			scopes: ScopeSet::default(),
			claims: BTreeMap::new(),
			expires_at,
		}
	}

	/// Attaches the bearer token's scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Attaches extra claims.
	pub fn with_claims(mut self, claims: BTreeMap<String, serde_json::Value>) -> Self {
		self.claims = claims;

		self
	}

	/// Returns a claim by name.
	pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
		self.claims.get(name)
	}

	/// Whether the bearer token has expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}
