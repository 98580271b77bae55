//! Provider hooks that classify token endpoint failures and decorate token requests.

// self
use crate::{_prelude::*, service::GrantType};

/// Per-provider behavior plugged into the authorizer.
///
/// Hooks only see crate-owned data so implementations never depend on the HTTP client in use.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed token request onto the canonical categories.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds provider-specific form fields (`audience`, `resource`, ...) to a token request.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical token endpoint failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// The authorization code or refresh token was rejected.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes were refused.
	InsufficientScope,
	/// Temporary failure; safe to retry.
	Transient,
}

/// Primitive view of a failed token request handed to [`ProviderStrategy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type of the failing request.
	pub grant_type: GrantType,
	/// HTTP status code, when one was received.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Truncated body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Set when the request never produced an HTTP response.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context for `grant_type`.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Context for a request that failed below HTTP.
	pub fn network_failure(grant_type: GrantType) -> Self {
		Self { network_error: true, ..Self::new(grant_type) }
	}

	/// Adds the HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description`.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to a fixed number of characters.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		let body = body.into();
		let preview = match body.char_indices().nth(Self::BODY_PREVIEW_LIMIT) {
			Some((cut, _)) => format!("{}…", &body[..cut]),
			None => body,
		};

		self.body_preview = Some(preview);

		self
	}

	/// Best human-readable reason for error messages.
	pub fn reason(&self) -> String {
		self.error_description
			.clone()
			.or_else(|| self.oauth_error.clone())
			.or_else(|| self.body_preview.clone())
			.or_else(|| self.http_status.map(|status| format!("HTTP {status}")))
			.unwrap_or_else(|| "token endpoint request failed".into())
	}
}

/// RFC 6749 driven classification.
///
/// Structured OAuth fields win, then body hints, then the HTTP status. Network failures are
/// always transient.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}

		ctx.oauth_error
			.as_deref()
			.and_then(classify_code)
			.or_else(|| ctx.error_description.as_deref().and_then(classify_text))
			.or_else(|| ctx.body_preview.as_deref().and_then(classify_text))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

fn classify_code(code: &str) -> Option<ProviderErrorKind> {
	match code.to_ascii_lowercase().as_str() {
		"invalid_grant" | "access_denied" => Some(ProviderErrorKind::InvalidGrant),
		"invalid_client" | "unauthorized_client" => Some(ProviderErrorKind::InvalidClient),
		"invalid_scope" | "insufficient_scope" => Some(ProviderErrorKind::InsufficientScope),
		"temporarily_unavailable" | "server_error" => Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_text(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	if lowered.contains("invalid_grant") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if lowered.contains("invalid_client") {
		Some(ProviderErrorKind::InvalidClient)
	} else if lowered.contains("insufficient_scope") || lowered.contains("invalid_scope") {
		Some(ProviderErrorKind::InsufficientScope)
	} else if lowered.contains("temporarily_unavailable") || lowered.contains("retry") {
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}
