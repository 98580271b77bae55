//! Inbound bearer token verification.
//!
//! [`Verifier`] checks a JWT's signature against the issuer's published keys, then its expiry,
//! not-before, issuer, and audience, and produces a [`Principal`](crate::auth::Principal). Keys
//! come from a [`KeySetSource`]: a fixed [`StaticKeySet`] or, with `reqwest`, an OIDC discovery
//! document via [`DiscoveryKeySource`].

pub mod keys;
pub mod verifier;

mod cache;

pub use keys::*;
pub use verifier::*;

// self
use crate::error::AuthError;

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
	let (scheme, token) = header.trim().split_once(' ').ok_or(AuthError::Malformed)?;
	let token = token.trim();

	if !scheme.eq_ignore_ascii_case("bearer")
		|| token.is_empty()
		|| token.contains(char::is_whitespace)
	{
		return Err(AuthError::Malformed);
	}

	Ok(token)
}
