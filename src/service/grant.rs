//! Grant flags carried by service descriptors.

// self
use crate::_prelude::*;

/// OAuth 2.0 grants the authorizer drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization Code grant used by the consent flow.
	AuthorizationCode,
	/// Refresh Token grant used to renew expired access tokens.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Grant flags enabled for a service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedGrants {
	/// Authorization Code grant.
	pub authorization_code: bool,
	/// Refresh Token grant.
	pub refresh_token: bool,
}
impl SupportedGrants {
	/// Both grants enabled.
	pub const ALL: Self = Self { authorization_code: true, refresh_token: true };

	/// Returns true if `grant` is enabled.
	pub fn supports(self, grant: GrantType) -> bool {
		match grant {
			GrantType::AuthorizationCode => self.authorization_code,
			GrantType::RefreshToken => self.refresh_token,
		}
	}

	/// Enables `grant`.
	pub fn enable(mut self, grant: GrantType) -> Self {
		match grant {
			GrantType::AuthorizationCode => self.authorization_code = true,
			GrantType::RefreshToken => self.refresh_token = true,
		}

		self
	}
}
